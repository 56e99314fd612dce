//! Full lifecycle runs against the admin fake and a mock CRUD service.

use crate::common::{
    crud_service, crud_service_with_create_reply, test_config, AdminCall, FakeAdmin,
    FakeBehavior, ROW_ID,
};
use spanner_crud_harness::lifecycle::{LifecycleRunner, RunError};
use spanner_crud_harness::provisioner::{ProvisionError, TeardownOutcome};
use spanner_crud_harness::verifier::{CrudVerifier, Step, VerifyError};
use tokio_test::assert_ok;

fn verifier_for(config: &spanner_crud_harness::Config) -> CrudVerifier {
    CrudVerifier::new(&config.service.url, config.service.response_timeout())
        .expect("Failed to build verifier")
}

#[tokio::test]
async fn lifecycle_success_creates_and_removes_each_resource_once() {
    let service = crud_service().await;
    let config = test_config(&service.uri());
    let admin = FakeAdmin::new(FakeBehavior {
        polls_until_done: 2,
        ..Default::default()
    });

    let runner = LifecycleRunner::from_config(&config).unwrap();
    let database = runner.plan().database.database.clone();
    let report = assert_ok!(runner.run(Box::new(admin.clone()), &verifier_for(&config)).await);

    let verification = report.verification.expect("verification should have run");
    assert_eq!(verification.row_id, ROW_ID);
    assert_eq!(verification.steps.len(), Step::ALL.len());
    assert!(report.teardown.is_clean());

    assert_eq!(
        admin.lifecycle_calls(),
        vec![
            AdminCall::CreateInstance("it-instance".to_string()),
            AdminCall::CreateDatabase(database.clone()),
            AdminCall::DropDatabase(database),
            AdminCall::DeleteInstance("it-instance".to_string()),
            AdminCall::Close,
        ]
    );
    assert!(admin
        .calls()
        .iter()
        .any(|c| matches!(c, AdminCall::GetOperation(_))));
}

#[tokio::test]
async fn lifecycle_verification_mismatch_still_tears_down() {
    let service = crud_service_with_create_reply("table NAMES already exists").await;
    let config = test_config(&service.uri());
    let admin = FakeAdmin::new(FakeBehavior::default());

    let runner = LifecycleRunner::from_config(&config).unwrap();
    let failure = runner
        .run(Box::new(admin.clone()), &verifier_for(&config))
        .await
        .unwrap_err();
    assert!(failure.teardown.is_clean());

    match failure.error {
        RunError::Verification(VerifyError::Mismatch { step, actual, .. }) => {
            assert_eq!(step, Step::CreateTable);
            assert_eq!(actual, "table NAMES already exists");
        }
        other => panic!("unexpected error: {}", other),
    }

    let calls = admin.lifecycle_calls();
    assert!(matches!(calls[2], AdminCall::DropDatabase(_)));
    assert!(matches!(calls[3], AdminCall::DeleteInstance(_)));
    assert_eq!(calls.last(), Some(&AdminCall::Close));

    // Nothing after the failed step was requested.
    let requests = service.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn lifecycle_instance_failure_never_creates_database() {
    let service = crud_service().await;
    let config = test_config(&service.uri());
    let admin = FakeAdmin::new(FakeBehavior {
        polls_until_done: 1,
        fail_instance_operation: true,
        ..Default::default()
    });

    let runner = LifecycleRunner::from_config(&config).unwrap();
    let failure = runner
        .run(Box::new(admin.clone()), &verifier_for(&config))
        .await
        .unwrap_err();
    assert!(matches!(
        failure.error,
        RunError::Provisioning(ProvisionError::Failure { .. })
    ));
    assert!(failure.to_string().contains("insufficient quota"));
    assert_eq!(failure.teardown.database, TeardownOutcome::Skipped);
    assert_eq!(failure.teardown.instance, TeardownOutcome::Removed);

    assert_eq!(
        admin.lifecycle_calls(),
        vec![
            AdminCall::CreateInstance("it-instance".to_string()),
            AdminCall::DeleteInstance("it-instance".to_string()),
            AdminCall::Close,
        ]
    );
    assert!(service
        .received_requests()
        .await
        .unwrap_or_default()
        .is_empty());
}

#[tokio::test]
async fn lifecycle_teardown_failures_do_not_fail_the_run() {
    let service = crud_service().await;
    let config = test_config(&service.uri());
    let admin = FakeAdmin::new(FakeBehavior {
        fail_drop_database: true,
        fail_delete_instance: true,
        ..Default::default()
    });

    let runner = LifecycleRunner::from_config(&config).unwrap();
    let report = runner
        .run(Box::new(admin.clone()), &verifier_for(&config))
        .await
        .expect("teardown errors must not fail the run");

    assert!(report.teardown.database.is_failed());
    assert!(report.teardown.instance.is_failed());
    assert!(!report.teardown.is_clean());

    let calls = admin.lifecycle_calls();
    let drop_at = calls
        .iter()
        .position(|c| matches!(c, AdminCall::DropDatabase(_)))
        .unwrap();
    let delete_at = calls
        .iter()
        .position(|c| matches!(c, AdminCall::DeleteInstance(_)))
        .unwrap();
    assert!(drop_at < delete_at);
    assert_eq!(
        calls.iter().filter(|c| **c == AdminCall::Close).count(),
        1
    );
}

#[tokio::test]
async fn lifecycle_skipped_verification_only_provisions() {
    let service = crud_service().await;
    let mut config = test_config(&service.uri());
    config.verification.enabled = false;
    let admin = FakeAdmin::new(FakeBehavior::default());

    let runner = LifecycleRunner::from_config(&config).unwrap();
    let report = runner
        .run(Box::new(admin.clone()), &verifier_for(&config))
        .await
        .unwrap();

    assert!(report.verification.is_none());
    assert_eq!(report.teardown.database, TeardownOutcome::Removed);
    assert_eq!(report.teardown.instance, TeardownOutcome::Removed);
    assert!(service
        .received_requests()
        .await
        .unwrap_or_default()
        .is_empty());
}

#[tokio::test]
async fn concurrent_runs_use_distinct_databases() {
    let service = crud_service().await;
    let config = test_config(&service.uri());

    let a = LifecycleRunner::from_config(&config).unwrap();
    let b = LifecycleRunner::from_config(&config).unwrap();
    assert_ne!(a.plan().database.database, b.plan().database.database);
}

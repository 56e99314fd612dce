//! Shared fixtures: an in-memory admin fake and a wiremock CRUD service.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use spanner_crud_harness::admin::{AdminClient, AdminError, Operation};
use spanner_crud_harness::config::Config;
use spanner_crud_harness::resource::{DatabaseRef, InstanceRef};
use spanner_crud_harness::verifier::{
    MISSING_ROW_ID, ROW_DELETED, ROW_INSERTED, ROW_MISSING, SAMPLE_NAME, TABLE_CREATED,
    TABLE_DROPPED,
};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{body_string, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ROW_ID: &str = "3e0b8d9c-1f4a-4c59-a8e2-6d1b2f0c7a55";

/// One call observed by [`FakeAdmin`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCall {
    CreateInstance(String),
    CreateDatabase(String),
    GetOperation(String),
    DropDatabase(String),
    DeleteInstance(String),
    Close,
}

/// Failure injection for [`FakeAdmin`]
#[derive(Debug, Clone, Default)]
pub struct FakeBehavior {
    /// Polls before each create operation reports done
    pub polls_until_done: usize,
    pub fail_instance_operation: bool,
    pub fail_drop_database: bool,
    pub fail_delete_instance: bool,
}

/// In-memory admin client that records every call
#[derive(Clone)]
pub struct FakeAdmin {
    behavior: FakeBehavior,
    calls: Arc<Mutex<Vec<AdminCall>>>,
    polls: Arc<Mutex<usize>>,
}

impl FakeAdmin {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(Mutex::new(Vec::new())),
            polls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn calls(&self) -> Vec<AdminCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls other than operation polling, in order
    pub fn lifecycle_calls(&self) -> Vec<AdminCall> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, AdminCall::GetOperation(_)))
            .collect()
    }

    fn record(&self, call: AdminCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn operation(&self, name: String) -> Operation {
        *self.polls.lock().unwrap() = 0;
        if self.behavior.polls_until_done == 0 {
            self.finish(name)
        } else {
            Operation::pending(name)
        }
    }

    fn finish(&self, name: String) -> Operation {
        let is_instance_op = name.contains("/instances/") && !name.contains("/databases/");
        if self.behavior.fail_instance_operation && is_instance_op {
            Operation::failed(name, 8, "insufficient quota")
        } else {
            Operation::completed(name)
        }
    }
}

#[async_trait]
impl AdminClient for FakeAdmin {
    async fn create_instance(&self, instance: &InstanceRef) -> Result<Operation, AdminError> {
        self.record(AdminCall::CreateInstance(instance.instance_id.clone()));
        Ok(self.operation(format!("{}/operations/create", instance.name())))
    }

    async fn create_database(&self, database: &DatabaseRef) -> Result<Operation, AdminError> {
        self.record(AdminCall::CreateDatabase(database.database.clone()));
        Ok(self.operation(format!("{}/operations/create", database.name())))
    }

    async fn get_operation(&self, name: &str) -> Result<Operation, AdminError> {
        self.record(AdminCall::GetOperation(name.to_string()));
        let mut polls = self.polls.lock().unwrap();
        *polls += 1;
        if *polls >= self.behavior.polls_until_done {
            Ok(self.finish(name.to_string()))
        } else {
            Ok(Operation::pending(name))
        }
    }

    async fn drop_database(&self, database: &DatabaseRef) -> Result<(), AdminError> {
        self.record(AdminCall::DropDatabase(database.database.clone()));
        if self.behavior.fail_drop_database {
            return Err(AdminError::ServerError {
                status: 503,
                message: "backend unavailable".to_string(),
            });
        }
        Ok(())
    }

    async fn delete_instance(&self, instance: &InstanceRef) -> Result<(), AdminError> {
        self.record(AdminCall::DeleteInstance(instance.instance_id.clone()));
        if self.behavior.fail_delete_instance {
            return Err(AdminError::AuthError("permission denied".to_string()));
        }
        Ok(())
    }

    async fn close(&self) {
        self.record(AdminCall::Close);
    }
}

/// Configuration pointing the service at `service_url`
pub fn test_config(service_url: &str) -> Config {
    Config::from_yaml(&format!(
        r#"
spanner:
  project: it-project
  instance: it-instance
  poll_interval_ms: 10
  operation_timeout: 5
service:
  url: {}
  response_timeout: 5
"#,
        service_url
    ))
    .expect("test config is valid")
}

async fn literal(server: &MockServer, route: &str, reply: &str) {
    Mock::given(method("POST"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(reply))
        .mount(server)
        .await;
}

/// A CRUD service that behaves correctly for one scripted pass
pub async fn crud_service() -> MockServer {
    let server = MockServer::start().await;
    mount_crud_routes(&server, TABLE_CREATED).await;
    server
}

/// A CRUD service whose `/createTable` replies with `create_reply`
pub async fn crud_service_with_create_reply(create_reply: &str) -> MockServer {
    let server = MockServer::start().await;
    mount_crud_routes(&server, create_reply).await;
    server
}

async fn mount_crud_routes(server: &MockServer, create_reply: &str) {
    literal(server, "/createTable", create_reply).await;

    // Fresh table first, then the inserted row.
    Mock::given(method("GET"))
        .and(path("/listRows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/listRows"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"name": SAMPLE_NAME, "uuid": ROW_ID}])),
        )
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/addRow"))
        .and(body_string(SAMPLE_NAME))
        .respond_with(ResponseTemplate::new(200).set_body_string(ROW_INSERTED))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/deleteRow"))
        .and(body_string(ROW_ID))
        .respond_with(ResponseTemplate::new(200).set_body_string(ROW_DELETED))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/deleteRow"))
        .and(body_string(MISSING_ROW_ID))
        .respond_with(ResponseTemplate::new(200).set_body_string(ROW_MISSING))
        .mount(server)
        .await;

    literal(server, "/dropTable", TABLE_DROPPED).await;
}

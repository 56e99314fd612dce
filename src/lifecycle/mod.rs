//! Run orchestration.
//!
//! One run is: generate the plan, create the instance and database, verify
//! the CRUD service, then tear down. Teardown runs on every exit path,
//! including provisioning errors, verification mismatches and panics in
//! the body. Teardown problems are reported but never replace the run's
//! own error.

use crate::admin::AdminClient;
use crate::config::{Config, ConfigError};
use crate::naming::{self, NamingError};
use crate::provisioner::{ProvisionError, ProvisionSettings, Provisioner, TeardownReport};
use crate::resource::{DatabaseRef, InstanceRef};
use crate::verifier::{CrudVerifier, VerificationReport, VerifyError};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors that fail a run
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Database naming error: {0}")]
    Naming(#[from] NamingError),

    #[error("Provisioning error: {0}")]
    Provisioning(#[from] ProvisionError),

    #[error("Verification error: {0}")]
    Verification(#[from] VerifyError),
}

/// A failed run, with what teardown managed to clean up
#[derive(Error, Debug)]
#[error("{error}")]
pub struct RunFailure {
    #[source]
    pub error: RunError,
    pub teardown: TeardownReport,
}

/// Everything a run needs, fixed at run start
#[derive(Debug, Clone, Serialize)]
pub struct RunPlan {
    pub instance: InstanceRef,
    pub database: DatabaseRef,
    pub service_url: String,
    pub verify: bool,
}

impl RunPlan {
    /// Build the plan, generating a fresh database name
    pub fn from_config(config: &Config) -> Result<Self, NamingError> {
        let instance = InstanceRef::from_config(config);
        let name = naming::generate_database_name(&config.database.name_prefix)?;
        let database = DatabaseRef::new(&instance, name, config.database.ddl.clone());

        Ok(Self {
            instance,
            database,
            service_url: config.service.url.clone(),
            verify: config.verification.enabled,
        })
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub plan: RunPlan,
    /// `None` when verification was disabled
    pub verification: Option<VerificationReport>,
    pub teardown: TeardownReport,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Drives one provision → verify → teardown cycle
pub struct LifecycleRunner {
    plan: RunPlan,
    settings: ProvisionSettings,
}

impl LifecycleRunner {
    pub fn new(plan: RunPlan, settings: ProvisionSettings) -> Self {
        Self { plan, settings }
    }

    /// Build a runner from configuration, generating the run plan
    pub fn from_config(config: &Config) -> Result<Self, RunError> {
        let plan = RunPlan::from_config(config)?;
        let settings = ProvisionSettings {
            operation_timeout: config.spanner.operation_timeout(),
            poll_interval: config.spanner.poll_interval(),
        };
        Ok(Self::new(plan, settings))
    }

    pub fn plan(&self) -> &RunPlan {
        &self.plan
    }

    /// Execute the run.
    ///
    /// The admin client is owned by the run and closed during teardown.
    /// The verifier is only used when the plan enables verification.
    /// A failure carries the teardown report alongside the error.
    pub async fn run(
        self,
        admin: Box<dyn AdminClient>,
        verifier: &CrudVerifier,
    ) -> Result<RunReport, RunFailure> {
        let started_at = Utc::now();
        let plan = self.plan;

        info!(
            instance = %plan.instance.name(),
            database = %plan.database.database,
            service = %plan.service_url,
            "Starting run"
        );

        let mut provisioner = Provisioner::new(admin, self.settings);

        let body = async {
            provisioner.create_instance(&plan.instance).await?;
            provisioner.create_database(&plan.database).await?;

            if !plan.verify {
                warn!("Verification disabled; provisioning and teardown only");
                return Ok(None);
            }
            let report = verifier.run().await?;
            Ok::<_, RunError>(Some(report))
        };

        let outcome = AssertUnwindSafe(body).catch_unwind().await;
        let teardown = provisioner.teardown().await;

        if !teardown.is_clean() {
            warn!(
                database = ?teardown.database,
                instance = ?teardown.instance,
                "Teardown left resources behind"
            );
        }

        match outcome {
            Err(payload) => {
                error!("Run body panicked; teardown completed, resuming panic");
                panic::resume_unwind(payload)
            }
            Ok(Err(error)) => {
                error!(error = %error, "Run failed");
                Err(RunFailure { error, teardown })
            }
            Ok(Ok(verification)) => {
                let finished_at = Utc::now();
                info!(
                    duration_ms = (finished_at - started_at).num_milliseconds(),
                    "Run completed successfully"
                );
                Ok(RunReport {
                    plan,
                    verification,
                    teardown,
                    started_at,
                    finished_at,
                })
            }
        }
    }
}

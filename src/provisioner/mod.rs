//! Instance and database provisioning for a single run.
//!
//! The provisioner walks the managed pair through
//! `Absent → InstanceCreating → InstanceReady → DatabaseCreating →
//! DatabaseReady → DatabaseDropping → InstanceDeleting → Absent`.
//! A timeout or error while creating moves it to `Failed`, from which
//! teardown is still allowed.
//!
//! Teardown consumes the provisioner, so it runs at most once and the admin
//! client is closed exactly once.

use crate::admin::{AdminClient, AdminError, Operation};
use crate::resource::{DatabaseRef, InstanceRef};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// The create operations the provisioner waits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    CreateInstance,
    CreateDatabase,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::CreateInstance => write!(f, "instance creation"),
            OperationKind::CreateDatabase => write!(f, "database creation"),
        }
    }
}

/// Errors that abort provisioning
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("{operation} did not complete within {timeout:?}")]
    Timeout {
        operation: OperationKind,
        timeout: Duration,
    },

    #[error("{operation} failed: {source}")]
    Failure {
        operation: OperationKind,
        #[source]
        source: AdminError,
    },

    #[error("{operation} is not allowed in state {state}")]
    InvalidState {
        operation: OperationKind,
        state: ProvisionState,
    },
}

/// Error recorded while removing a resource; logged, never propagated
#[derive(Error, Debug)]
#[error("failed to remove {resource}: {source}")]
pub struct TeardownError {
    pub resource: String,
    #[source]
    pub source: AdminError,
}

/// Lifecycle state of the managed instance/database pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProvisionState {
    Absent,
    InstanceCreating,
    InstanceReady,
    DatabaseCreating,
    DatabaseReady,
    DatabaseDropping,
    InstanceDeleting,
    Failed,
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProvisionState::Absent => "absent",
            ProvisionState::InstanceCreating => "instance-creating",
            ProvisionState::InstanceReady => "instance-ready",
            ProvisionState::DatabaseCreating => "database-creating",
            ProvisionState::DatabaseReady => "database-ready",
            ProvisionState::DatabaseDropping => "database-dropping",
            ProvisionState::InstanceDeleting => "instance-deleting",
            ProvisionState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of removing one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "lowercase")]
pub enum TeardownOutcome {
    /// Removed successfully
    Removed,
    /// Never requested, nothing to remove
    Skipped,
    Failed(String),
}

impl TeardownOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, TeardownOutcome::Failed(_))
    }
}

/// What teardown did with each resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub database: TeardownOutcome,
    pub instance: TeardownOutcome,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        !self.database.is_failed() && !self.instance.is_failed()
    }
}

/// Timing knobs for create operations
#[derive(Debug, Clone, Copy)]
pub struct ProvisionSettings {
    /// Bound on each create operation
    pub operation_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Creates and removes the instance/database pair for one run
pub struct Provisioner {
    admin: Box<dyn AdminClient>,
    settings: ProvisionSettings,
    state: ProvisionState,
    // Set once the create request is submitted; a timed-out create may
    // still finish remotely, so teardown targets these.
    instance: Option<InstanceRef>,
    database: Option<DatabaseRef>,
}

impl Provisioner {
    pub fn new(admin: Box<dyn AdminClient>, settings: ProvisionSettings) -> Self {
        Self {
            admin,
            settings,
            state: ProvisionState::Absent,
            instance: None,
            database: None,
        }
    }

    pub fn state(&self) -> ProvisionState {
        self.state
    }

    /// Create the instance and wait for the operation to finish
    pub async fn create_instance(
        &mut self,
        instance: &InstanceRef,
    ) -> Result<InstanceRef, ProvisionError> {
        let operation = OperationKind::CreateInstance;
        if self.state != ProvisionState::Absent {
            return Err(ProvisionError::InvalidState {
                operation,
                state: self.state,
            });
        }

        self.state = ProvisionState::InstanceCreating;
        let submitted = self.admin.create_instance(instance).await;
        // Only a rejected submit is known not to have created anything.
        if submitted.is_ok() {
            self.instance = Some(instance.clone());
        }

        match self.finish(operation, submitted).await {
            Ok(()) => {
                self.state = ProvisionState::InstanceReady;
                info!(instance = %instance.name(), "Instance ready");
                Ok(instance.clone())
            }
            Err(e) => {
                self.state = ProvisionState::Failed;
                Err(e)
            }
        }
    }

    /// Create the database inside the ready instance and wait for it
    pub async fn create_database(
        &mut self,
        database: &DatabaseRef,
    ) -> Result<DatabaseRef, ProvisionError> {
        let operation = OperationKind::CreateDatabase;
        if self.state != ProvisionState::InstanceReady {
            return Err(ProvisionError::InvalidState {
                operation,
                state: self.state,
            });
        }

        self.state = ProvisionState::DatabaseCreating;
        let submitted = self.admin.create_database(database).await;
        if submitted.is_ok() {
            self.database = Some(database.clone());
        }

        match self.finish(operation, submitted).await {
            Ok(()) => {
                self.state = ProvisionState::DatabaseReady;
                info!(database = %database.name(), "Database ready");
                Ok(database.clone())
            }
            Err(e) => {
                self.state = ProvisionState::Failed;
                Err(e)
            }
        }
    }

    async fn finish(
        &self,
        operation: OperationKind,
        submitted: Result<Operation, AdminError>,
    ) -> Result<(), ProvisionError> {
        let op = submitted.map_err(|source| ProvisionError::Failure { operation, source })?;

        match timeout(self.settings.operation_timeout, self.await_operation(op)).await {
            Ok(result) => result.map_err(|source| ProvisionError::Failure { operation, source }),
            Err(_) => {
                warn!(
                    %operation,
                    timeout_secs = self.settings.operation_timeout.as_secs(),
                    "Admin operation timed out"
                );
                Err(ProvisionError::Timeout {
                    operation,
                    timeout: self.settings.operation_timeout,
                })
            }
        }
    }

    async fn await_operation(&self, mut op: Operation) -> Result<(), AdminError> {
        loop {
            if let Some(outcome) = op.outcome() {
                return outcome;
            }
            debug!(operation = %op.name, "Operation still running");
            tokio::time::sleep(self.settings.poll_interval).await;
            op = self.admin.get_operation(&op.name).await?;
        }
    }

    /// Remove whatever was requested, database first, then close the client.
    ///
    /// Both removals are attempted regardless of earlier failures. Errors
    /// are logged and reported, never returned.
    pub async fn teardown(mut self) -> TeardownReport {
        info!(state = %self.state, "Starting teardown");

        let database = match self.database.take() {
            Some(db) => {
                self.state = ProvisionState::DatabaseDropping;
                outcome_of(
                    self.admin.drop_database(&db).await.map_err(|source| TeardownError {
                        resource: db.name(),
                        source,
                    }),
                )
            }
            None => TeardownOutcome::Skipped,
        };

        let instance = match self.instance.take() {
            Some(instance) => {
                self.state = ProvisionState::InstanceDeleting;
                outcome_of(
                    self.admin
                        .delete_instance(&instance)
                        .await
                        .map_err(|source| TeardownError {
                            resource: instance.name(),
                            source,
                        }),
                )
            }
            None => TeardownOutcome::Skipped,
        };

        self.admin.close().await;
        self.state = ProvisionState::Absent;

        let report = TeardownReport { database, instance };
        info!(
            database = ?report.database,
            instance = ?report.instance,
            "Teardown finished"
        );
        report
    }
}

fn outcome_of(result: Result<(), TeardownError>) -> TeardownOutcome {
    match result {
        Ok(()) => TeardownOutcome::Removed,
        Err(e) => {
            error!(error = %e, "Teardown step failed");
            TeardownOutcome::Failed(e.to_string())
        }
    }
}

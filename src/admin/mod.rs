//! Spanner administrative surface.
//!
//! This module defines the `AdminClient` trait the provisioner drives, the
//! long-running `Operation` handle returned by create requests, and a
//! factory for the REST implementation.

pub mod rest;

use crate::config::SpannerConfig;
use crate::resource::{DatabaseRef, InstanceRef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by the admin API
#[derive(Error, Debug)]
pub enum AdminError {
    #[error("Request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Server returned error {status}: {message}")]
    ServerError { status: u16, message: String },

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Operation {name} failed with code {code}: {message}")]
    OperationFailed {
        name: String,
        code: i32,
        message: String,
    },

    #[error("Admin client is closed")]
    Closed,
}

/// Error status carried by a finished operation (`google.rpc.Status`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

/// Handle to a long-running admin operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,

    #[serde(default)]
    pub done: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationStatus>,
}

impl Operation {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            done: false,
            error: None,
        }
    }

    pub fn completed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            done: true,
            error: None,
        }
    }

    pub fn failed(name: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            done: true,
            error: Some(OperationStatus {
                code,
                message: message.into(),
            }),
        }
    }

    /// `None` while running, otherwise the final outcome
    pub fn outcome(&self) -> Option<Result<(), AdminError>> {
        if !self.done {
            return None;
        }
        Some(match &self.error {
            Some(status) => Err(AdminError::OperationFailed {
                name: self.name.clone(),
                code: status.code,
                message: status.message.clone(),
            }),
            None => Ok(()),
        })
    }
}

/// Trait for Spanner instance and database administration
///
/// Create calls return as soon as the request is accepted; completion is
/// observed by polling [`AdminClient::get_operation`]. Drop and delete
/// calls complete synchronously.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AdminClient: Send + Sync {
    /// Submit an instance create request
    async fn create_instance(&self, instance: &InstanceRef) -> Result<Operation, AdminError>;

    /// Submit a database create request; the instance must already exist
    async fn create_database(&self, database: &DatabaseRef) -> Result<Operation, AdminError>;

    /// Fetch the current state of an operation by name
    async fn get_operation(&self, name: &str) -> Result<Operation, AdminError>;

    async fn drop_database(&self, database: &DatabaseRef) -> Result<(), AdminError>;

    async fn delete_instance(&self, instance: &InstanceRef) -> Result<(), AdminError>;

    /// Release the connection. Later calls fail with [`AdminError::Closed`].
    async fn close(&self);
}

/// Create the admin client for the configured endpoint
pub fn create_admin_client(config: &SpannerConfig) -> Result<Box<dyn AdminClient>, AdminError> {
    let client = rest::RestAdminClient::new(config)?;
    Ok(Box::new(client))
}

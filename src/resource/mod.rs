//! Handles for the Spanner resources a run creates and removes.

use crate::config::Config;
use serde::{Deserialize, Serialize};

/// A provisioned Spanner instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRef {
    pub project: String,
    pub instance_id: String,
    pub config_id: String,
    pub display_name: String,
    pub processing_units: u32,
}

impl InstanceRef {
    pub fn from_config(config: &Config) -> Self {
        let spanner = &config.spanner;
        Self {
            project: spanner.project.clone(),
            instance_id: spanner.instance.clone(),
            config_id: spanner.instance_config.clone(),
            display_name: spanner
                .display_name
                .clone()
                .unwrap_or_else(|| spanner.instance.clone()),
            processing_units: spanner.processing_units,
        }
    }

    /// `projects/{project}`
    pub fn parent(&self) -> String {
        format!("projects/{}", self.project)
    }

    /// `projects/{project}/instances/{instance}`
    pub fn name(&self) -> String {
        format!("{}/instances/{}", self.parent(), self.instance_id)
    }

    /// `projects/{project}/instanceConfigs/{config}`
    pub fn config_name(&self) -> String {
        format!("{}/instanceConfigs/{}", self.parent(), self.config_id)
    }
}

/// A logical database inside an [`InstanceRef`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseRef {
    pub project: String,
    pub instance_id: String,
    pub database: String,
    #[serde(default)]
    pub ddl: Vec<String>,
}

impl DatabaseRef {
    pub fn new(instance: &InstanceRef, database: impl Into<String>, ddl: Vec<String>) -> Self {
        Self {
            project: instance.project.clone(),
            instance_id: instance.instance_id.clone(),
            database: database.into(),
            ddl,
        }
    }

    /// `projects/{project}/instances/{instance}`
    pub fn instance_name(&self) -> String {
        format!("projects/{}/instances/{}", self.project, self.instance_id)
    }

    /// `projects/{project}/instances/{instance}/databases/{database}`
    pub fn name(&self) -> String {
        format!("{}/databases/{}", self.instance_name(), self.database)
    }

    /// The `CREATE DATABASE` statement for this database
    pub fn create_statement(&self) -> String {
        format!("CREATE DATABASE `{}`", self.database)
    }
}

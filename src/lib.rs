//! Spanner CRUD Harness - end-to-end check for a Spanner-backed CRUD service.
//!
//! This crate provisions a temporary Cloud Spanner instance and database,
//! drives a fixed CRUD scenario against a REST service backed by it, and
//! tears the resources down again whatever the outcome.
//!
//! # Features
//!
//! - **Unique databases**: every run gets a freshly generated database id,
//!   so concurrent runs never collide.
//! - **Bounded provisioning**: instance and database creation each wait on
//!   their long-running operation up to a fixed timeout.
//! - **Guaranteed teardown**: database then instance are removed on every
//!   exit path, including verification failures and panics.
//!
//! # Example
//!
//! ```no_run
//! use spanner_crud_harness::{admin, config::Config, lifecycle::LifecycleRunner, verifier::CrudVerifier};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Load configuration
//!     let config = Config::from_env()?;
//!
//!     let admin = admin::create_admin_client(&config.spanner)?;
//!     let verifier = CrudVerifier::new(&config.service.url, config.service.response_timeout())?;
//!
//!     let report = LifecycleRunner::from_config(&config)?
//!         .run(admin, &verifier)
//!         .await?;
//!
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```

pub mod admin;
pub mod config;
pub mod lifecycle;
pub mod naming;
pub mod provisioner;
pub mod resource;
pub mod verifier;

pub use config::Config;
pub use lifecycle::{LifecycleRunner, RunError, RunFailure, RunPlan, RunReport};

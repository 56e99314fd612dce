//! Cloud Spanner Admin REST (v1) client.
//!
//! Talks to `spanner.googleapis.com` with a bearer token, or to the
//! emulator's REST port without one.

use super::{AdminClient, AdminError, Operation};
use crate::config::SpannerConfig;
use crate::resource::{DatabaseRef, InstanceRef};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateInstanceRequest<'a> {
    instance_id: &'a str,
    instance: InstanceBody,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InstanceBody {
    name: String,
    config: String,
    display_name: String,
    processing_units: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateDatabaseRequest<'a> {
    create_statement: String,
    extra_statements: &'a [String],
}

/// Admin client over the Spanner REST API
pub struct RestAdminClient {
    client: Client,
    endpoint: String,
    access_token: Option<String>,
    closed: AtomicBool,
}

impl RestAdminClient {
    pub fn new(config: &SpannerConfig) -> Result<Self, AdminError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!(
                "spanner-crud-harness/{}",
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            closed: AtomicBool::new(false),
        })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, AdminError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AdminError::Closed);
        }

        let url = format!("{}/v1/{}", self.endpoint, path);
        let mut builder = self.client.request(method, url);
        if let Some(token) = &self.access_token {
            builder = builder.bearer_auth(token);
        }
        Ok(builder)
    }

    async fn check(response: Response) -> Result<Response, AdminError> {
        let status = response.status();

        debug!(status = %status, url = %response.url(), "Received admin API response");

        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AdminError::AuthError(message)),
            _ => Err(AdminError::ServerError {
                status: status.as_u16(),
                message,
            }),
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, AdminError> {
        let response = Self::check(builder.send().await?).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl AdminClient for RestAdminClient {
    async fn create_instance(&self, instance: &InstanceRef) -> Result<Operation, AdminError> {
        info!(
            instance = %instance.name(),
            config = %instance.config_id,
            processing_units = instance.processing_units,
            "Submitting instance create request"
        );

        let body = CreateInstanceRequest {
            instance_id: &instance.instance_id,
            instance: InstanceBody {
                name: instance.name(),
                config: instance.config_name(),
                display_name: instance.display_name.clone(),
                processing_units: instance.processing_units,
            },
        };

        let builder = self
            .request(Method::POST, &format!("{}/instances", instance.parent()))?
            .json(&body);
        self.send_json(builder).await
    }

    async fn create_database(&self, database: &DatabaseRef) -> Result<Operation, AdminError> {
        info!(
            database = %database.name(),
            ddl_statements = database.ddl.len(),
            "Submitting database create request"
        );

        let body = CreateDatabaseRequest {
            create_statement: database.create_statement(),
            extra_statements: &database.ddl,
        };

        let builder = self
            .request(
                Method::POST,
                &format!("{}/databases", database.instance_name()),
            )?
            .json(&body);
        self.send_json(builder).await
    }

    async fn get_operation(&self, name: &str) -> Result<Operation, AdminError> {
        let builder = self.request(Method::GET, name)?;
        self.send_json(builder).await
    }

    async fn drop_database(&self, database: &DatabaseRef) -> Result<(), AdminError> {
        info!(database = %database.name(), "Dropping database");
        let builder = self.request(Method::DELETE, &database.name())?;
        Self::check(builder.send().await?).await?;
        Ok(())
    }

    async fn delete_instance(&self, instance: &InstanceRef) -> Result<(), AdminError> {
        info!(instance = %instance.name(), "Deleting instance");
        let builder = self.request(Method::DELETE, &instance.name())?;
        Self::check(builder.send().await?).await?;
        Ok(())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Admin client closed");
        }
    }
}

//! CRUD verification against the service under test.
//!
//! Runs a fixed, ordered script of HTTP calls and compares each response
//! body with the expected literal or shape. The first mismatch aborts the
//! script. Nothing is retried.

use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

pub const TABLE_CREATED: &str = "table NAMES created successfully";
pub const ROW_INSERTED: &str = "row inserted successfully";
pub const ROW_DELETED: &str = "row deleted successfully";
pub const ROW_MISSING: &str = "row did not exist";
pub const TABLE_DROPPED: &str = "table NAMES dropped successfully";

/// Name inserted by the add-row step
pub const SAMPLE_NAME: &str = "Bob";

/// Identifier used to exercise deletion of a missing row
pub const MISSING_ROW_ID: &str = "nonexistent";

/// A row exposed by `/listRows`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRecord {
    pub uuid: String,
    pub name: String,
}

/// The verification script, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    CreateTable,
    ListRowsEmpty,
    AddRow,
    ListRowsSingle,
    DeleteRow,
    DeleteMissingRow,
    DropTable,
}

impl Step {
    pub const ALL: [Step; 7] = [
        Step::CreateTable,
        Step::ListRowsEmpty,
        Step::AddRow,
        Step::ListRowsSingle,
        Step::DeleteRow,
        Step::DeleteMissingRow,
        Step::DropTable,
    ];

    pub fn method(&self) -> Method {
        match self {
            Step::ListRowsEmpty | Step::ListRowsSingle => Method::GET,
            _ => Method::POST,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Step::CreateTable => "/createTable",
            Step::ListRowsEmpty | Step::ListRowsSingle => "/listRows",
            Step::AddRow => "/addRow",
            Step::DeleteRow | Step::DeleteMissingRow => "/deleteRow",
            Step::DropTable => "/dropTable",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method(), self.path())
    }
}

/// Errors that fail verification
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("{step}: request failed: {source}")]
    RequestError {
        step: Step,
        #[source]
        source: reqwest::Error,
    },

    #[error("{step}: expected {expected}, got {actual:?}")]
    Mismatch {
        step: Step,
        expected: String,
        actual: String,
    },

    #[error("Failed to build HTTP client: {0}")]
    ClientError(#[from] reqwest::Error),
}

impl VerifyError {
    /// The step that failed, if any request was issued
    pub fn step(&self) -> Option<Step> {
        match self {
            VerifyError::RequestError { step, .. } | VerifyError::Mismatch { step, .. } => {
                Some(*step)
            }
            VerifyError::ClientError(_) => None,
        }
    }
}

/// Timing of one completed step
#[derive(Debug, Clone, Serialize)]
pub struct StepTiming {
    pub step: Step,
    pub status: u16,
    pub elapsed_ms: u128,
}

/// Result of a successful verification run
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    /// Identifier assigned to the inserted row
    pub row_id: String,
    pub steps: Vec<StepTiming>,
}

/// Runs the CRUD script against one service base URL
pub struct CrudVerifier {
    client: Client,
    base_url: String,
}

impl CrudVerifier {
    /// Create a verifier whose requests each wait up to `response_timeout`
    pub fn new(base_url: &str, response_timeout: Duration) -> Result<Self, VerifyError> {
        let client = Client::builder()
            .timeout(response_timeout)
            .user_agent(format!(
                "spanner-crud-harness/{}",
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Execute every step in order, stopping at the first mismatch
    pub async fn run(&self) -> Result<VerificationReport, VerifyError> {
        info!(service = %self.base_url, "Starting CRUD verification");

        let mut steps = Vec::with_capacity(Step::ALL.len());
        let mut row_id = None;

        for step in Step::ALL {
            let body = match step {
                Step::AddRow => Some(SAMPLE_NAME.to_string()),
                // Consumes the identifier captured by the previous listing.
                Step::DeleteRow => row_id.clone(),
                Step::DeleteMissingRow => Some(MISSING_ROW_ID.to_string()),
                _ => None,
            };

            let start = Instant::now();
            let (status, text) = self.send(step, body).await?;

            match step {
                Step::CreateTable => expect_literal(step, TABLE_CREATED, &text)?,
                Step::ListRowsEmpty => expect_empty_list(step, &text)?,
                Step::AddRow => expect_literal(step, ROW_INSERTED, &text)?,
                Step::ListRowsSingle => {
                    row_id = Some(expect_single_record(step, SAMPLE_NAME, &text)?.uuid);
                }
                Step::DeleteRow => expect_literal(step, ROW_DELETED, &text)?,
                Step::DeleteMissingRow => expect_literal(step, ROW_MISSING, &text)?,
                Step::DropTable => expect_literal(step, TABLE_DROPPED, &text)?,
            }

            let elapsed = start.elapsed();
            debug!(%step, status, elapsed_ms = elapsed.as_millis(), "Step passed");
            steps.push(StepTiming {
                step,
                status,
                elapsed_ms: elapsed.as_millis(),
            });
        }

        let row_id = row_id.unwrap_or_default();
        info!(row_id = %row_id, "CRUD verification passed");
        Ok(VerificationReport { row_id, steps })
    }

    async fn send(&self, step: Step, body: Option<String>) -> Result<(u16, String), VerifyError> {
        let url = format!("{}{}", self.base_url, step.path());
        let mut request = self.client.request(step.method(), url);
        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "text/plain")
                .body(body);
        }

        let wrap = |source| VerifyError::RequestError { step, source };
        let response = request.send().await.map_err(wrap)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(wrap)?;

        debug!(%step, status, body = %text, "Received service response");
        Ok((status, text))
    }
}

fn expect_literal(step: Step, expected: &str, actual: &str) -> Result<(), VerifyError> {
    if actual == expected {
        Ok(())
    } else {
        Err(VerifyError::Mismatch {
            step,
            expected: format!("{:?}", expected),
            actual: actual.to_string(),
        })
    }
}

fn expect_empty_list(step: Step, actual: &str) -> Result<(), VerifyError> {
    match serde_json::from_str::<Vec<serde_json::Value>>(actual) {
        Ok(rows) if rows.is_empty() => Ok(()),
        _ => Err(VerifyError::Mismatch {
            step,
            expected: "an empty list".to_string(),
            actual: actual.to_string(),
        }),
    }
}

fn expect_single_record(step: Step, name: &str, actual: &str) -> Result<NameRecord, VerifyError> {
    let mismatch = || VerifyError::Mismatch {
        step,
        expected: format!("exactly one row named {:?} with an identifier", name),
        actual: actual.to_string(),
    };

    let mut rows: Vec<NameRecord> = serde_json::from_str(actual).map_err(|_| mismatch())?;
    if rows.len() != 1 {
        return Err(mismatch());
    }
    let record = rows.remove(0);
    if record.name != name || record.uuid.is_empty() {
        return Err(mismatch());
    }
    Ok(record)
}

//! Configuration management for the harness.
//!
//! Supports loading configuration from:
//! - YAML config files (with `${VAR}` expansion)
//! - Environment variables
//! - Command-line arguments

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

static ENV_VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"));

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub spanner: SpannerConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Spanner project, instance and admin API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpannerConfig {
    // Absent keys default to empty so `validate` reports them as missing.
    #[serde(default)]
    pub project: String,

    /// Instance to create for the run and delete afterwards
    #[serde(default)]
    pub instance: String,

    #[serde(default = "default_instance_config")]
    pub instance_config: String,

    /// Defaults to the instance id
    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default = "default_processing_units")]
    pub processing_units: u32,

    #[serde(default = "default_admin_endpoint")]
    pub endpoint: String,

    /// OAuth2 bearer token; not needed against the emulator
    #[serde(default)]
    pub access_token: Option<String>,

    /// Bound on each instance/database create operation, in seconds
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for SpannerConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            instance: String::new(),
            instance_config: default_instance_config(),
            display_name: None,
            processing_units: default_processing_units(),
            endpoint: default_admin_endpoint(),
            access_token: None,
            operation_timeout: default_operation_timeout(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl SpannerConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// The CRUD service under test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_url")]
    pub url: String,

    /// Per-request response timeout in seconds; schema changes are slow
    #[serde(default = "default_response_timeout")]
    pub response_timeout: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: default_service_url(),
            response_timeout: default_response_timeout(),
        }
    }
}

impl ServiceConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout)
    }
}

/// Generated database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    /// Extra DDL applied when the database is created
    #[serde(default)]
    pub ddl: Vec<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name_prefix: default_name_prefix(),
            ddl: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    #[serde(default = "default_verification_enabled")]
    pub enabled: bool,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            enabled: default_verification_enabled(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

// Default value functions
fn default_instance_config() -> String {
    "regional-us-central1".to_string()
}

fn default_processing_units() -> u32 {
    100
}

fn default_admin_endpoint() -> String {
    "https://spanner.googleapis.com".to_string()
}

fn default_operation_timeout() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_service_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_response_timeout() -> u64 {
    240
}

fn default_name_prefix() -> String {
    "r2dbc-".to_string()
}

fn default_verification_enabled() -> bool {
    true
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text, expanding `${VAR}` references first
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// `from_env` delegates here; tests pass a map instead of mutating the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingField(key.to_string()))
        };

        let project = required("GOOGLE_CLOUD_PROJECT")?;
        let instance = required("SPANNER_TEST_INSTANCE")?;

        let processing_units = match lookup("SPANNER_PROCESSING_UNITS") {
            Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "SPANNER_PROCESSING_UNITS must be a positive integer, got {:?}",
                    raw
                ))
            })?,
            None => default_processing_units(),
        };

        let duration = |key: &str, default: fn() -> u64| match lookup(key) {
            Some(raw) => parse_duration_secs(&raw).ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "{} must be a duration like \"60s\", \"5m\" or \"1h\", got {:?}",
                    key, raw
                ))
            }),
            None => Ok(default()),
        };

        let operation_timeout = duration("SPANNER_OPERATION_TIMEOUT", default_operation_timeout)?;
        let response_timeout = duration("CRUD_RESPONSE_TIMEOUT", default_response_timeout)?;

        let log_level = lookup("LOG_LEVEL")
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(LogLevel::Trace),
                "debug" => Some(LogLevel::Debug),
                "info" => Some(LogLevel::Info),
                "warn" => Some(LogLevel::Warn),
                "error" => Some(LogLevel::Error),
                _ => None,
            })
            .unwrap_or_else(default_log_level);

        let log_format = lookup("LOG_FORMAT")
            .and_then(|s| match s.to_lowercase().as_str() {
                "json" => Some(LogFormat::Json),
                "pretty" => Some(LogFormat::Pretty),
                _ => None,
            })
            .unwrap_or_else(default_log_format);

        let config = Config {
            spanner: SpannerConfig {
                project,
                instance,
                instance_config: lookup("SPANNER_INSTANCE_CONFIG")
                    .unwrap_or_else(default_instance_config),
                display_name: None,
                processing_units,
                endpoint: lookup("SPANNER_ADMIN_ENDPOINT").unwrap_or_else(default_admin_endpoint),
                access_token: lookup("SPANNER_ACCESS_TOKEN").filter(|t| !t.is_empty()),
                operation_timeout,
                poll_interval_ms: default_poll_interval_ms(),
            },
            service: ServiceConfig {
                url: lookup("CRUD_SERVICE_URL").unwrap_or_else(default_service_url),
                response_timeout,
            },
            database: DatabaseConfig {
                name_prefix: lookup("DATABASE_NAME_PREFIX").unwrap_or_else(default_name_prefix),
                ddl: Vec::new(),
            },
            verification: VerificationConfig::default(),
            logging: LoggingConfig {
                level: log_level,
                format: log_format,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        // A `${VAR}` left over after expansion means the variable was unset.
        for (field, value) in [
            ("spanner.project", &self.spanner.project),
            ("spanner.instance", &self.spanner.instance),
        ] {
            if value.trim().is_empty() || ENV_VAR_PATTERN.is_match(value) {
                return Err(ConfigError::MissingField(field.to_string()));
            }
        }

        for (field, url) in [
            ("spanner.endpoint", &self.spanner.endpoint),
            ("service.url", &self.service.url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be an http(s) URL, got {:?}",
                    field, url
                )));
            }
        }

        if self.spanner.processing_units == 0 {
            return Err(ConfigError::ValidationError(
                "Processing units must be greater than zero".to_string(),
            ));
        }

        if self.spanner.operation_timeout == 0 || self.service.response_timeout == 0 {
            return Err(ConfigError::ValidationError(
                "Timeouts must be at least one second".to_string(),
            ));
        }

        if self.spanner.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "Poll interval cannot be zero".to_string(),
            ));
        }

        crate::naming::validate_prefix(&self.database.name_prefix)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        Ok(())
    }
}

/// Expand environment variables in a string using ${VAR} syntax
fn expand_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR_PATTERN.captures_iter(input) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

/// Parse duration string like "60s", "5m", "1h" into seconds
fn parse_duration_secs(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (num_str, suffix) = if let Some(n) = s.strip_suffix('s') {
        (n, 1u64)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60u64)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3600u64)
    } else {
        (s, 1u64)
    };

    num_str.parse::<u64>().ok().and_then(|n| n.checked_mul(suffix))
}

//! Configuration System
//!
//! Layered configuration for a sync session: built-in defaults, the user's
//! global file, the workspace's `config/` directory and finally
//! `FACTORY_SYNC__SECTION__FIELD` environment variables.

use crate::logging::{parse_format, parse_output, LoggingConfig};
use crate::query::CacheConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Poll cadences (milliseconds) and page sizes for watched queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_status_running_ms")]
    pub status_running_ms: u64,
    #[serde(default = "default_logs_running_ms")]
    pub logs_running_ms: u64,
    #[serde(default = "default_cycles_running_ms")]
    pub cycles_running_ms: u64,
    #[serde(default = "default_events_running_ms")]
    pub events_running_ms: u64,
    /// Cadence for project-scoped keys while the loop is not running
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u64,
    #[serde(default = "default_projects_ms")]
    pub projects_ms: u64,
    #[serde(default = "default_consensus_ms")]
    pub consensus_ms: u64,
    #[serde(default = "default_log_lines")]
    pub log_lines: u32,
    #[serde(default = "default_event_limit")]
    pub event_limit: u32,
}

fn default_status_running_ms() -> u64 {
    2000
}

fn default_logs_running_ms() -> u64 {
    1500
}

fn default_cycles_running_ms() -> u64 {
    3000
}

fn default_events_running_ms() -> u64 {
    3000
}

fn default_idle_ms() -> u64 {
    10_000
}

fn default_projects_ms() -> u64 {
    10_000
}

fn default_consensus_ms() -> u64 {
    5000
}

fn default_log_lines() -> u32 {
    200
}

fn default_event_limit() -> u32 {
    50
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            status_running_ms: default_status_running_ms(),
            logs_running_ms: default_logs_running_ms(),
            cycles_running_ms: default_cycles_running_ms(),
            events_running_ms: default_events_running_ms(),
            idle_ms: default_idle_ms(),
            projects_ms: default_projects_ms(),
            consensus_ms: default_consensus_ms(),
            log_lines: default_log_lines(),
            event_limit: default_event_limit(),
        }
    }
}

impl PollingConfig {
    fn cadences(&self) -> [(&'static str, u64); 7] {
        [
            ("status_running_ms", self.status_running_ms),
            ("logs_running_ms", self.logs_running_ms),
            ("cycles_running_ms", self.cycles_running_ms),
            ("events_running_ms", self.events_running_ms),
            ("idle_ms", self.idle_ms),
            ("projects_ms", self.projects_ms),
            ("consensus_ms", self.consensus_ms),
        ]
    }
}

/// Which backend transport to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Http,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    /// Base URL for the http backend
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            endpoint: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Cache(String),
    Polling(String, String),
    Backend(String),
    Logging(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Cache(msg) => write!(f, "Cache: {}", msg),
            ValidationError::Polling(field, msg) => write!(f, "Polling '{}': {}", field, msg),
            ValidationError::Backend(msg) => write!(f, "Backend: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl SyncConfig {
    /// Validate the entire configuration, collecting every problem
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.cache.stale_time_ms == 0 {
            errors.push(ValidationError::Cache(
                "stale_time_ms must be greater than zero".to_string(),
            ));
        }
        if self.cache.event_capacity == 0 {
            errors.push(ValidationError::Cache(
                "event_capacity must be greater than zero".to_string(),
            ));
        }

        for (field, value) in self.polling.cadences() {
            if value == 0 {
                errors.push(ValidationError::Polling(
                    field.to_string(),
                    "cadence must be greater than zero".to_string(),
                ));
            }
        }
        if self.polling.log_lines == 0 {
            errors.push(ValidationError::Polling(
                "log_lines".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        if self.backend.kind == BackendKind::Http {
            let endpoint = self.backend.endpoint.as_deref().unwrap_or("").trim();
            if endpoint.is_empty() {
                errors.push(ValidationError::Backend(
                    "http backend requires an endpoint".to_string(),
                ));
            } else if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                errors.push(ValidationError::Backend(format!(
                    "endpoint must be an http(s) URL, got '{}'",
                    endpoint
                )));
            }
        }
        if self.backend.request_timeout_ms == 0 {
            errors.push(ValidationError::Backend(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }

        if let Err(e) = parse_format(&self.logging.format) {
            errors.push(ValidationError::Logging(e.to_string()));
        }
        if let Err(e) = parse_output(&self.logging.output) {
            errors.push(ValidationError::Logging(e.to_string()));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

//! Error types for the factory dashboard synchronization layer.

use crate::query::QueryKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by the backend for a query or command.
///
/// This is also the error info retained on a cache entry after a failed fetch,
/// so it is `Clone` and serializable.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum BackendError {
    /// Network or timeout-like failure; eligible for one automatic retry.
    #[error("Transient backend failure: {0}")]
    Transient(String),

    /// Malformed input. Never retried.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The referenced id no longer exists.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Well-formed request refused by the backend (e.g. loop already running).
    #[error("Rejected: {0}")]
    Rejected(String),
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transient(_))
    }
}

/// Errors surfaced by the synchronization API
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cached value for {key} could not be decoded: {message}")]
    Decode { key: QueryKey, message: String },

    #[error("No tokio runtime available to drive fetches")]
    RuntimeUnavailable,

    #[error("Fetch for {0} was abandoned before completing")]
    FetchAbandoned(QueryKey),

    #[error("No fetcher registered for {0}")]
    UnknownQuery(QueryKey),
}

impl SyncError {
    /// The backend error behind this failure, if any.
    pub fn backend(&self) -> Option<&BackendError> {
        match self {
            SyncError::Backend(err) => Some(err),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for SyncError {
    fn from(err: config::ConfigError) -> Self {
        SyncError::ConfigError(err.to_string())
    }
}

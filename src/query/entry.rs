//! Cache entry snapshots.

use crate::error::{BackendError, SyncError};
use crate::query::QueryKey;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

/// Lifecycle status of a cached query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// Snapshot of one cache entry as returned by `QueryCache::read`.
///
/// `data` survives failed fetches: after an error the previous successful
/// value is still here alongside `last_error`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryEntry {
    pub key: QueryKey,
    pub data: Option<Value>,
    /// Monotonic time of the last successful fetch (drives staleness)
    pub fetched_at: Option<Instant>,
    /// Wall-clock time of the last successful fetch (for display)
    pub updated_at: Option<DateTime<Utc>>,
    pub status: QueryStatus,
    pub last_error: Option<BackendError>,
    pub request_generation: u64,
    /// Whether the entry was stale at the moment of the snapshot
    pub is_stale: bool,
}

impl QueryEntry {
    pub(crate) fn idle(key: QueryKey) -> Self {
        Self {
            key,
            data: None,
            fetched_at: None,
            updated_at: None,
            status: QueryStatus::Idle,
            last_error: None,
            request_generation: 0,
            is_stale: true,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    /// Decode the cached value into a concrete type
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>, SyncError> {
        match &self.data {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| SyncError::Decode {
                    key: self.key.clone(),
                    message: e.to_string(),
                }),
        }
    }

    /// Typed view over this entry
    pub fn view<T: DeserializeOwned>(&self) -> Result<QueryView<T>, SyncError> {
        Ok(QueryView {
            data: self.decode()?,
            status: self.status,
            error: self.last_error.clone(),
            is_stale: self.is_stale,
            updated_at: self.updated_at,
        })
    }
}

/// Typed projection of a cache entry for rendering
#[derive(Debug, Clone, PartialEq)]
pub struct QueryView<T> {
    pub data: Option<T>,
    pub status: QueryStatus,
    pub error: Option<BackendError>,
    pub is_stale: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T> QueryView<T> {
    /// Last good data is shown together with an error indicator
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

//! Cacheable backend queries and their keys.

use crate::backend::Backend;
use crate::catalog::CatalogKind;
use crate::config::PollingConfig;
use crate::error::BackendError;
use crate::query::{Fetcher, QueryCache, QueryKey};
use crate::scheduler::Cadence;
use crate::types::RuntimeStatus;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// One side-effect-free backend request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    Status(String),
    Cycles(String),
    Logs { project_id: String, lines: u32 },
    Consensus(String),
    Events { project_id: String, limit: u32 },
    Projects,
    Catalog(CatalogKind),
    CustomCatalog(CatalogKind),
    Override(String),
    LibraryToggles,
    Settings,
}

impl Query {
    pub fn status(project_id: impl Into<String>) -> Self {
        Query::Status(project_id.into())
    }

    pub fn cycles(project_id: impl Into<String>) -> Self {
        Query::Cycles(project_id.into())
    }

    pub fn logs(project_id: impl Into<String>, lines: u32) -> Self {
        Query::Logs {
            project_id: project_id.into(),
            lines,
        }
    }

    pub fn events(project_id: impl Into<String>, limit: u32) -> Self {
        Query::Events {
            project_id: project_id.into(),
            limit,
        }
    }

    /// Structural cache key, e.g. `["logs","p1",200]`
    pub fn key(&self) -> QueryKey {
        match self {
            Query::Status(p) => QueryKey::new("status").with(p),
            Query::Cycles(p) => QueryKey::new("cycles").with(p),
            Query::Logs { project_id, lines } => {
                QueryKey::new("logs").with(project_id).with(*lines)
            }
            Query::Consensus(p) => QueryKey::new("consensus").with(p),
            Query::Events { project_id, limit } => {
                QueryKey::new("events").with(project_id).with(*limit)
            }
            Query::Projects => QueryKey::new("projects"),
            Query::Catalog(kind) => QueryKey::new("catalog").with(kind.as_str()),
            Query::CustomCatalog(kind) => QueryKey::new("customCatalog").with(kind.as_str()),
            Query::Override(p) => QueryKey::new("override").with(p),
            Query::LibraryToggles => QueryKey::new("libraryToggles"),
            Query::Settings => QueryKey::new("settings"),
        }
    }

    pub fn project_id(&self) -> Option<&str> {
        match self {
            Query::Status(p) | Query::Cycles(p) | Query::Consensus(p) | Query::Override(p) => {
                Some(p)
            }
            Query::Logs { project_id, .. } | Query::Events { project_id, .. } => Some(project_id),
            _ => None,
        }
    }

    /// Fetcher issuing this query against `backend`
    pub fn fetcher(&self, backend: Arc<dyn Backend>) -> Fetcher {
        let query = self.clone();
        Arc::new(move || {
            let backend = Arc::clone(&backend);
            let query = query.clone();
            async move { query.run(backend.as_ref()).await }.boxed()
        })
    }

    async fn run(&self, backend: &dyn Backend) -> Result<Value, BackendError> {
        match self {
            Query::Status(p) => encode(backend.status(p).await?),
            Query::Cycles(p) => encode(backend.cycle_history(p).await?),
            Query::Logs { project_id, lines } => encode(backend.tail_log(project_id, *lines).await?),
            Query::Consensus(p) => encode(backend.consensus(p).await?),
            Query::Events { project_id, limit } => encode(backend.events(project_id, *limit).await?),
            Query::Projects => encode(backend.list_projects().await?),
            Query::Catalog(kind) => encode(backend.list_catalog(*kind).await?),
            Query::CustomCatalog(kind) => encode(backend.list_custom_catalog(*kind).await?),
            Query::Override(p) => encode(backend.get_override(p).await?),
            Query::LibraryToggles => encode(backend.library_toggles().await?),
            Query::Settings => encode(backend.settings().await?),
        }
    }

    /// Default polling cadence for this query.
    ///
    /// Project-scoped live data polls fast while the project's loop is
    /// running and slows to `idle_ms` otherwise; the running flag is read
    /// from the cached status entry on every tick.
    pub fn default_cadence(&self, polling: &PollingConfig) -> Cadence {
        let running_ms = match self {
            Query::Status(_) => polling.status_running_ms,
            Query::Logs { .. } => polling.logs_running_ms,
            Query::Cycles(_) => polling.cycles_running_ms,
            Query::Events { .. } => polling.events_running_ms,
            Query::Consensus(_) => return Cadence::every_ms(polling.consensus_ms),
            Query::Projects => return Cadence::every_ms(polling.projects_ms),
            _ => return Cadence::Manual,
        };
        let Some(project_id) = self.project_id() else {
            return Cadence::Manual;
        };
        running_aware(
            project_id.to_string(),
            Duration::from_millis(running_ms),
            Duration::from_millis(polling.idle_ms),
        )
    }
}

fn encode<T: Serialize>(value: T) -> Result<Value, BackendError> {
    serde_json::to_value(value)
        .map_err(|e| BackendError::Rejected(format!("Unencodable backend response: {}", e)))
}

/// Whether the cached status for `project_id` reports a running loop
pub fn is_running(cache: &QueryCache, project_id: &str) -> bool {
    cache
        .peek(&Query::status(project_id).key())
        .and_then(|entry| entry.decode::<RuntimeStatus>().ok().flatten())
        .map(|status| status.is_running)
        .unwrap_or(false)
}

/// `running` while the project's loop runs, `idle` otherwise
pub fn running_aware(project_id: String, running: Duration, idle: Duration) -> Cadence {
    Cadence::dynamic(move |cache| {
        if is_running(cache, &project_id) {
            running
        } else {
            idle
        }
    })
}

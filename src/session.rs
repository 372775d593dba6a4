//! Sync Session
//!
//! One session owns the query cache, the fetch scheduler and the
//! invalidation bus for a single interactive dashboard. Renderers watch
//! queries and read typed views; mutations go through [`SyncSession::execute`]
//! which validates, calls the backend and invalidates the command's keys
//! before returning.

use crate::backend::{Backend, HttpBackend, MemoryBackend};
use crate::catalog::{apply_toggles, merge_tagged, CatalogEntity, CatalogKind, CustomPayload, LibraryToggleState, Sourced};
use crate::config::{BackendConfig, BackendKind, PollingConfig, SyncConfig};
use crate::error::{BackendError, SyncError};
use crate::invalidation::{InvalidationBus, InvalidationReport};
use crate::overrides::{resolve, resolve_detailed, EffectiveConfig, GlobalRuntime, ResolvedRuntimeConfig, RuntimeOverride};
use crate::palette::{build_index, CommandItem};
use crate::query::{CacheConfig, CacheEvent, CacheStats, QueryCache, QueryEntry, QueryView};
use crate::scheduler::{Cadence, FetchScheduler, Subscription, SubscriptionRequest};
use crate::types::{AiProvider, AppSettings, Project};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

pub mod commands;
pub mod queries;

pub use commands::Command;
pub use queries::{is_running, running_aware, Query};

/// Result of a successful command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    /// Stored entity for add/update custom entity commands
    pub entity: Option<CatalogEntity>,
    pub invalidation: InvalidationReport,
}

/// Build the backend selected by configuration
pub fn connect(config: &BackendConfig) -> Result<Arc<dyn Backend>, SyncError> {
    match config.kind {
        BackendKind::Memory => Ok(Arc::new(MemoryBackend::demo())),
        BackendKind::Http => {
            let endpoint = config.endpoint.clone().ok_or_else(|| {
                SyncError::ConfigError("http backend requires an endpoint".to_string())
            })?;
            Ok(Arc::new(HttpBackend::new(endpoint, config.request_timeout())?))
        }
    }
}

pub struct SyncSession {
    backend: Arc<dyn Backend>,
    cache: QueryCache,
    scheduler: FetchScheduler,
    invalidation: InvalidationBus,
    polling: PollingConfig,
}

impl SyncSession {
    pub fn new(backend: Arc<dyn Backend>, config: &SyncConfig) -> Self {
        Self::with_parts(backend, &config.cache, config.polling.clone())
    }

    pub fn with_parts(backend: Arc<dyn Backend>, cache: &CacheConfig, polling: PollingConfig) -> Self {
        let cache = QueryCache::new(cache);
        info!("Sync session started");
        Self {
            backend,
            scheduler: FetchScheduler::new(cache.clone()),
            invalidation: InvalidationBus::new(cache.clone()),
            cache,
            polling,
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn scheduler(&self) -> &FetchScheduler {
        &self.scheduler
    }

    pub fn polling(&self) -> &PollingConfig {
        &self.polling
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn events(&self) -> broadcast::Receiver<CacheEvent> {
        self.cache.events()
    }

    fn register(&self, query: &Query) {
        self.cache
            .register(query.key(), query.fetcher(Arc::clone(&self.backend)));
    }

    /// Watch a query at its default cadence
    pub fn watch(&self, query: Query) -> Subscription {
        let cadence = query.default_cadence(&self.polling);
        self.watch_with(query, cadence)
    }

    pub fn watch_with(&self, query: Query, cadence: Cadence) -> Subscription {
        debug!(key = %query.key(), ?cadence, "Watching query");
        let fetcher = query.fetcher(Arc::clone(&self.backend));
        self.scheduler
            .subscribe_with(SubscriptionRequest::new(query.key(), fetcher, cadence))
    }

    /// Status, logs, cycles and events for one project
    pub fn watch_project(&self, project_id: &str) -> Vec<Subscription> {
        vec![
            self.watch(Query::status(project_id)),
            self.watch(Query::logs(project_id, self.polling.log_lines)),
            self.watch(Query::cycles(project_id)),
            self.watch(Query::events(project_id, self.polling.event_limit)),
        ]
    }

    /// Current cache entry for `query`
    pub fn read(&self, query: &Query) -> QueryEntry {
        self.register(query);
        self.cache.read(&query.key())
    }

    pub fn view<T: DeserializeOwned>(&self, query: &Query) -> Result<QueryView<T>, SyncError> {
        self.read(query).view()
    }

    /// Value for `query`, from cache when fresh
    pub async fn fetch(&self, query: &Query) -> Result<Value, SyncError> {
        self.register(query);
        self.cache.fetch(&query.key())?.wait().await
    }

    pub async fn fetch_as<T: DeserializeOwned>(&self, query: &Query) -> Result<T, SyncError> {
        let key = query.key();
        let value = self.fetch(query).await?;
        serde_json::from_value(value).map_err(|e| SyncError::Decode {
            key,
            message: e.to_string(),
        })
    }

    /// Manual refetch; always issues a new request
    pub async fn refetch(&self, query: &Query) -> Result<Value, SyncError> {
        self.register(query);
        self.cache.refetch(&query.key())?.wait().await
    }

    fn cached<T: DeserializeOwned>(&self, query: &Query) -> Result<Option<T>, SyncError> {
        self.read(query).decode()
    }

    /// Merged base + custom list for `kind` with toggle flags applied.
    /// `None` until both lists are cached.
    pub fn library(&self, kind: CatalogKind) -> Result<Option<Vec<Sourced<CatalogEntity>>>, SyncError> {
        let base: Option<Vec<CatalogEntity>> = self.cached(&Query::Catalog(kind))?;
        let custom: Option<Vec<CatalogEntity>> = self.cached(&Query::CustomCatalog(kind))?;
        let (Some(base), Some(custom)) = (base, custom) else {
            return Ok(None);
        };
        let toggles: LibraryToggleState = self.cached(&Query::LibraryToggles)?.unwrap_or_default();
        let mut merged = merge_tagged(&base, &custom);
        apply_toggles(kind, &mut merged, &toggles);
        Ok(Some(merged))
    }

    fn override_and_settings(
        &self,
        project_id: &str,
    ) -> Result<Option<(AppSettings, RuntimeOverride)>, SyncError> {
        let settings: Option<AppSettings> = self.cached(&Query::Settings)?;
        let override_: Option<RuntimeOverride> = self.cached(&Query::Override(project_id.to_string()))?;
        Ok(settings.zip(override_))
    }

    /// Engine and model for a project, from cached settings and override
    pub fn effective_config(&self, project_id: &str) -> Result<Option<EffectiveConfig>, SyncError> {
        Ok(self
            .override_and_settings(project_id)?
            .map(|(settings, override_)| resolve(&GlobalRuntime::from_settings(&settings), &override_)))
    }

    pub fn resolved_runtime(&self, project_id: &str) -> Result<Option<ResolvedRuntimeConfig>, SyncError> {
        Ok(self
            .override_and_settings(project_id)?
            .map(|(settings, override_)| resolve_detailed(&settings, &override_)))
    }

    /// Command palette items over the cached project list
    pub fn command_items(&self) -> Result<Vec<CommandItem>, SyncError> {
        let projects: Vec<Project> = self.cached(&Query::Projects)?.unwrap_or_default();
        Ok(build_index(&projects))
    }

    /// Validate, run and invalidate.
    ///
    /// Validation failures never reach the backend and leave the cache
    /// untouched; backend failures are returned as-is.
    pub async fn execute(&self, command: &Command) -> Result<CommandOutput, SyncError> {
        command.validate()?;
        let entity = command.dispatch(self.backend.as_ref()).await.map_err(|err| {
            debug!(command = command.name(), error = %err, "Command failed");
            err
        })?;
        let invalidation = self.invalidation.apply(&command.affected_keys());
        info!(
            command = command.name(),
            refetched = invalidation.refetched.len(),
            "Command succeeded"
        );
        Ok(CommandOutput {
            entity,
            invalidation,
        })
    }

    pub async fn start(&self, project_id: &str, engine: &str, model: &str) -> Result<CommandOutput, SyncError> {
        self.execute(&Command::Start {
            project_id: project_id.to_string(),
            engine: engine.to_string(),
            model: model.to_string(),
        })
        .await
    }

    pub async fn stop(&self, project_id: &str) -> Result<CommandOutput, SyncError> {
        self.execute(&Command::Stop {
            project_id: project_id.to_string(),
        })
        .await
    }

    pub async fn delete_project(&self, project_id: &str) -> Result<CommandOutput, SyncError> {
        self.execute(&Command::DeleteProject {
            project_id: project_id.to_string(),
        })
        .await
    }

    pub async fn set_override(
        &self,
        project_id: &str,
        override_: RuntimeOverride,
    ) -> Result<CommandOutput, SyncError> {
        self.execute(&Command::SetOverride {
            project_id: project_id.to_string(),
            override_,
        })
        .await
    }

    pub async fn toggle_library_item(
        &self,
        kind: CatalogKind,
        id: &str,
        enabled: bool,
    ) -> Result<CommandOutput, SyncError> {
        self.execute(&Command::ToggleLibraryItem {
            kind,
            id: id.to_string(),
            enabled,
        })
        .await
    }

    pub async fn add_custom_entity(&self, payload: CustomPayload) -> Result<CatalogEntity, SyncError> {
        let output = self.execute(&Command::AddCustomEntity { payload }).await?;
        output.entity.ok_or_else(|| {
            SyncError::from(BackendError::Rejected("backend returned no entity".to_string()))
        })
    }

    pub async fn update_custom_entity(
        &self,
        id: &str,
        payload: CustomPayload,
    ) -> Result<CatalogEntity, SyncError> {
        let output = self
            .execute(&Command::UpdateCustomEntity {
                id: id.to_string(),
                payload,
            })
            .await?;
        output.entity.ok_or_else(|| {
            SyncError::from(BackendError::Rejected("backend returned no entity".to_string()))
        })
    }

    pub async fn remove_custom_entity(&self, kind: CatalogKind, id: &str) -> Result<CommandOutput, SyncError> {
        self.execute(&Command::RemoveCustomEntity {
            kind,
            id: id.to_string(),
        })
        .await
    }

    pub async fn save_settings(&self, settings: AppSettings) -> Result<CommandOutput, SyncError> {
        self.execute(&Command::SaveSettings { settings }).await
    }

    pub async fn add_provider(&self, provider: AiProvider) -> Result<CommandOutput, SyncError> {
        self.execute(&Command::AddProvider { provider }).await
    }

    pub async fn remove_provider(&self, provider_id: &str) -> Result<CommandOutput, SyncError> {
        self.execute(&Command::RemoveProvider {
            provider_id: provider_id.to_string(),
        })
        .await
    }

    /// Cancel all polling timers. Cached entries stay readable.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        info!("Sync session stopped");
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.scheduler.shutdown();
    }
}

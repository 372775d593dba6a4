//! CLI route: single route table and run context. Dispatches to the sync session and presentation.

use crate::config::{ConfigLoader, SyncConfig};
use crate::error::{BackendError, SyncError};
use crate::palette::filter;
use crate::query::CacheEvent;
use crate::session::{connect, Query, SyncSession};
use crate::types::{Project, RuntimeStatus};
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::cli::parse::Commands;
use crate::cli::presentation::{
    format_catalog_table, format_palette, format_projects_table, format_resolved_runtime,
    format_status_line,
};

/// Runtime context for CLI execution: loaded config and one sync session.
pub struct RunContext {
    config: SyncConfig,
    session: SyncSession,
}

impl RunContext {
    /// Load config (explicit file, else layered sources), validate it and connect.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, SyncError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        config.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            SyncError::ConfigError(messages.join("; "))
        })?;

        let backend = connect(&config.backend)?;
        let session = SyncSession::new(backend, &config);
        Ok(Self { config, session })
    }

    pub fn from_session(config: SyncConfig, session: SyncSession) -> Self {
        Self { config, session }
    }

    pub fn session(&self) -> &SyncSession {
        &self.session
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub async fn execute(&self, command: &Commands) -> Result<String, SyncError> {
        let started = Instant::now();
        let result = match command {
            Commands::Projects => self.handle_projects().await,
            Commands::Catalog { kind } => self.handle_catalog(*kind).await,
            Commands::Palette { query } => self.handle_palette(query).await,
            Commands::Resolve { project } => self.handle_resolve(project).await,
            Commands::Start {
                project,
                engine,
                model,
            } => {
                self.handle_start(project, engine.as_deref(), model.as_deref())
                    .await
            }
            Commands::Stop { project } => self.handle_stop(project).await,
            Commands::Watch { project, updates } => self.handle_watch(project, *updates).await,
        };
        debug!(
            command = command.name(),
            ok = result.is_ok(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Command routed"
        );
        result
    }

    async fn handle_projects(&self) -> Result<String, SyncError> {
        let projects: Vec<Project> = self.session.fetch_as(&Query::Projects).await?;
        Ok(format_projects_table(&projects))
    }

    async fn handle_catalog(&self, kind: crate::catalog::CatalogKind) -> Result<String, SyncError> {
        self.session.fetch(&Query::Catalog(kind)).await?;
        self.session.fetch(&Query::CustomCatalog(kind)).await?;
        self.session.fetch(&Query::LibraryToggles).await?;
        let entries = self.session.library(kind)?.unwrap_or_default();
        Ok(format_catalog_table(kind, &entries))
    }

    async fn handle_palette(&self, query: &str) -> Result<String, SyncError> {
        self.session.fetch(&Query::Projects).await?;
        let items = self.session.command_items()?;
        Ok(format_palette(query, &filter(&items, query)))
    }

    async fn load_runtime_inputs(&self, project_id: &str) -> Result<(), SyncError> {
        self.session.fetch(&Query::Settings).await?;
        self.session
            .fetch(&Query::Override(project_id.to_string()))
            .await?;
        Ok(())
    }

    async fn handle_resolve(&self, project_id: &str) -> Result<String, SyncError> {
        self.load_runtime_inputs(project_id).await?;
        let resolved = self
            .session
            .resolved_runtime(project_id)?
            .ok_or_else(|| missing_runtime(project_id))?;
        Ok(format_resolved_runtime(project_id, &resolved))
    }

    async fn handle_start(
        &self,
        project_id: &str,
        engine: Option<&str>,
        model: Option<&str>,
    ) -> Result<String, SyncError> {
        self.load_runtime_inputs(project_id).await?;
        let effective = self
            .session
            .effective_config(project_id)?
            .ok_or_else(|| missing_runtime(project_id))?;
        let engine = engine.unwrap_or(effective.engine.as_str());
        let model = model.unwrap_or(effective.model.as_str());

        self.session.start(project_id, engine, model).await?;
        info!(project = project_id, engine, model, "Started project loop");
        Ok(format!("Started {} ({} / {})", project_id, engine, model))
    }

    async fn handle_stop(&self, project_id: &str) -> Result<String, SyncError> {
        self.session.stop(project_id).await?;
        Ok(format!("Stopped {}", project_id))
    }

    /// Print status and new log lines as they arrive until `updates` status
    /// updates have been shown.
    async fn handle_watch(&self, project_id: &str, updates: usize) -> Result<String, SyncError> {
        let mut events = self.session.events();
        let status_query = Query::status(project_id);
        let logs_query = Query::logs(project_id, self.config.polling.log_lines);
        let status_key = status_query.key();
        let logs_key = logs_query.key();
        let _status = self.session.watch(status_query.clone());
        let _logs = self.session.watch(logs_query.clone());

        let mut shown = 0;
        let mut printed_lines = 0;
        while shown < updates {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Watch fell behind cache events");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            match event {
                CacheEvent::Updated { key, .. } if key == status_key => {
                    if let Some(status) = self.session.view::<RuntimeStatus>(&status_query)?.data {
                        println!("{}", format_status_line(project_id, &status));
                        shown += 1;
                    }
                }
                CacheEvent::Updated { key, .. } if key == logs_key => {
                    let lines: Vec<String> = self
                        .session
                        .view::<Vec<String>>(&logs_query)?
                        .data
                        .unwrap_or_default();
                    if lines.len() < printed_lines {
                        printed_lines = 0;
                    }
                    for line in &lines[printed_lines..] {
                        println!("  {}", line);
                    }
                    printed_lines = lines.len();
                }
                CacheEvent::Failed { key, error, .. } if key == status_key => {
                    if !error.is_transient() {
                        return Err(error.into());
                    }
                    warn!(project = project_id, error = %error, "Status poll failed");
                }
                _ => {}
            }
        }
        Ok(format!("Watched {} status update(s) for {}", shown, project_id))
    }

    pub fn shutdown(&self) {
        self.session.shutdown();
    }
}

fn missing_runtime(project_id: &str) -> SyncError {
    BackendError::NotFound(format!("runtime settings for {}", project_id)).into()
}

//! Process-management backend boundary
//!
//! Every query and command the session issues goes through [`Backend`]. The
//! trait says nothing about transport: [`MemoryBackend`] answers in-process
//! and [`HttpBackend`] forwards each call as a JSON request.

use crate::catalog::{CatalogEntity, CatalogKind, CustomPayload, LibraryToggleState};
use crate::error::BackendError;
use crate::overrides::RuntimeOverride;
use crate::types::{
    AiProvider, AppSettings, ConsensusState, CycleResult, Project, ProjectEvent, RuntimeStatus,
};
use async_trait::async_trait;

pub mod http;
pub mod memory;

pub use http::HttpBackend;
pub use memory::MemoryBackend;

/// Wire names of backend operations
pub mod ops {
    pub const STATUS: &str = "status";
    pub const CYCLE_HISTORY: &str = "cycle_history";
    pub const TAIL_LOG: &str = "tail_log";
    pub const CONSENSUS: &str = "consensus";
    pub const EVENTS: &str = "events";
    pub const LIST_PROJECTS: &str = "list_projects";
    pub const LIST_CATALOG: &str = "list_catalog";
    pub const LIST_CUSTOM_CATALOG: &str = "list_custom_catalog";
    pub const GET_OVERRIDE: &str = "get_override";
    pub const GET_LIBRARY_TOGGLES: &str = "get_library_toggles";
    pub const GET_SETTINGS: &str = "get_settings";

    pub const START: &str = "start";
    pub const STOP: &str = "stop";
    pub const DELETE_PROJECT: &str = "delete_project";
    pub const SET_OVERRIDE: &str = "set_override";
    pub const TOGGLE_LIBRARY_ITEM: &str = "toggle_library_item";
    pub const ADD_CUSTOM_ENTITY: &str = "add_custom_entity";
    pub const UPDATE_CUSTOM_ENTITY: &str = "update_custom_entity";
    pub const REMOVE_CUSTOM_ENTITY: &str = "remove_custom_entity";
    pub const SAVE_SETTINGS: &str = "save_settings";
    pub const ADD_PROVIDER: &str = "add_provider";
    pub const REMOVE_PROVIDER: &str = "remove_provider";
}

/// Queries are side-effect free; commands change backend state.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn status(&self, project_id: &str) -> Result<RuntimeStatus, BackendError>;
    async fn cycle_history(&self, project_id: &str) -> Result<Vec<CycleResult>, BackendError>;
    async fn tail_log(&self, project_id: &str, lines: u32) -> Result<Vec<String>, BackendError>;
    async fn consensus(&self, project_id: &str) -> Result<ConsensusState, BackendError>;
    async fn events(&self, project_id: &str, limit: u32) -> Result<Vec<ProjectEvent>, BackendError>;
    async fn list_projects(&self) -> Result<Vec<Project>, BackendError>;
    async fn list_catalog(&self, kind: CatalogKind) -> Result<Vec<CatalogEntity>, BackendError>;
    async fn list_custom_catalog(&self, kind: CatalogKind) -> Result<Vec<CatalogEntity>, BackendError>;
    async fn get_override(&self, project_id: &str) -> Result<RuntimeOverride, BackendError>;
    async fn library_toggles(&self) -> Result<LibraryToggleState, BackendError>;
    async fn settings(&self) -> Result<AppSettings, BackendError>;

    async fn start(&self, project_id: &str, engine: &str, model: &str) -> Result<(), BackendError>;
    async fn stop(&self, project_id: &str) -> Result<(), BackendError>;
    async fn delete_project(&self, project_id: &str) -> Result<(), BackendError>;
    async fn set_override(
        &self,
        project_id: &str,
        override_: &RuntimeOverride,
    ) -> Result<(), BackendError>;
    async fn toggle_library_item(
        &self,
        kind: CatalogKind,
        id: &str,
        enabled: bool,
    ) -> Result<(), BackendError>;
    async fn add_custom_entity(&self, payload: &CustomPayload) -> Result<CatalogEntity, BackendError>;
    async fn update_custom_entity(
        &self,
        id: &str,
        payload: &CustomPayload,
    ) -> Result<CatalogEntity, BackendError>;
    async fn remove_custom_entity(&self, kind: CatalogKind, id: &str) -> Result<(), BackendError>;
    async fn save_settings(&self, settings: &AppSettings) -> Result<(), BackendError>;
    async fn add_provider(&self, provider: &AiProvider) -> Result<(), BackendError>;
    async fn remove_provider(&self, provider_id: &str) -> Result<(), BackendError>;
}

/// Check a provider before it is sent to the backend
pub fn validate_provider(provider: &AiProvider) -> Result<(), BackendError> {
    if provider.id.trim().is_empty() {
        return Err(BackendError::Validation("provider id is required".to_string()));
    }
    if provider.name.trim().is_empty() {
        return Err(BackendError::Validation("provider name is required".to_string()));
    }
    if !provider.is_claude() && provider.api_base_url.trim().is_empty() {
        return Err(BackendError::Validation(format!(
            "provider '{}' needs an API base URL",
            provider.id
        )));
    }
    Ok(())
}

//! JSON-over-HTTP backend.
//!
//! Each call is `POST {endpoint}/invoke/{op}` with the arguments as a JSON
//! object; a 2xx body is the result. Status codes map onto the error
//! taxonomy so the cache knows which failures are worth a retry.

use super::{ops, Backend};
use crate::catalog::{CatalogEntity, CatalogKind, CustomPayload, LibraryToggleState};
use crate::error::BackendError;
use crate::overrides::RuntimeOverride;
use crate::types::{
    AiProvider, AppSettings, ConsensusState, CycleResult, Project, ProjectEvent, RuntimeStatus,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn map_http_error(error: reqwest::Error) -> BackendError {
    if let Some(status) = error.status() {
        error_for_status(status, error.to_string())
    } else if error.is_timeout() {
        BackendError::Transient(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        BackendError::Transient(format!("Connection error: {}", error))
    } else {
        BackendError::Transient(format!("HTTP error: {}", error))
    }
}

fn error_for_status(status: StatusCode, body: String) -> BackendError {
    match status.as_u16() {
        400 | 422 => BackendError::Validation(body),
        404 => BackendError::NotFound(body),
        409 => BackendError::Rejected(body),
        408 | 429 => BackendError::Transient(body),
        code if code >= 500 => BackendError::Transient(format!("HTTP {}: {}", code, body)),
        code => BackendError::Rejected(format!("HTTP {}: {}", code, body)),
    }
}

pub struct HttpBackend {
    client: Client,
    endpoint: String,
}

impl HttpBackend {
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder()
            .no_proxy()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .timeout(request_timeout)
            .build()
            .map_err(|e| BackendError::Rejected(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, op: &str, args: Value) -> Result<reqwest::Response, BackendError> {
        let url = format!("{}/invoke/{}", self.endpoint, op);
        debug!(op, url = %url, "Backend request");
        let response = self
            .client
            .post(&url)
            .json(&args)
            .send()
            .await
            .map_err(map_http_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(error_for_status(status, body));
        }
        Ok(response)
    }

    async fn invoke<T: DeserializeOwned>(&self, op: &str, args: Value) -> Result<T, BackendError> {
        self.send(op, args)
            .await?
            .json::<T>()
            .await
            .map_err(|e| BackendError::Rejected(format!("Malformed response to {}: {}", op, e)))
    }

    async fn invoke_unit(&self, op: &str, args: Value) -> Result<(), BackendError> {
        self.send(op, args).await.map(|_| ())
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn status(&self, project_id: &str) -> Result<RuntimeStatus, BackendError> {
        self.invoke(ops::STATUS, json!({ "project_id": project_id })).await
    }

    async fn cycle_history(&self, project_id: &str) -> Result<Vec<CycleResult>, BackendError> {
        self.invoke(ops::CYCLE_HISTORY, json!({ "project_id": project_id }))
            .await
    }

    async fn tail_log(&self, project_id: &str, lines: u32) -> Result<Vec<String>, BackendError> {
        self.invoke(ops::TAIL_LOG, json!({ "project_id": project_id, "lines": lines }))
            .await
    }

    async fn consensus(&self, project_id: &str) -> Result<ConsensusState, BackendError> {
        self.invoke(ops::CONSENSUS, json!({ "project_id": project_id }))
            .await
    }

    async fn events(&self, project_id: &str, limit: u32) -> Result<Vec<ProjectEvent>, BackendError> {
        self.invoke(ops::EVENTS, json!({ "project_id": project_id, "limit": limit }))
            .await
    }

    async fn list_projects(&self) -> Result<Vec<Project>, BackendError> {
        self.invoke(ops::LIST_PROJECTS, json!({})).await
    }

    async fn list_catalog(&self, kind: CatalogKind) -> Result<Vec<CatalogEntity>, BackendError> {
        self.invoke(ops::LIST_CATALOG, json!({ "kind": kind })).await
    }

    async fn list_custom_catalog(&self, kind: CatalogKind) -> Result<Vec<CatalogEntity>, BackendError> {
        self.invoke(ops::LIST_CUSTOM_CATALOG, json!({ "kind": kind }))
            .await
    }

    async fn get_override(&self, project_id: &str) -> Result<RuntimeOverride, BackendError> {
        self.invoke(ops::GET_OVERRIDE, json!({ "project_id": project_id }))
            .await
    }

    async fn library_toggles(&self) -> Result<LibraryToggleState, BackendError> {
        self.invoke(ops::GET_LIBRARY_TOGGLES, json!({})).await
    }

    async fn settings(&self) -> Result<AppSettings, BackendError> {
        self.invoke(ops::GET_SETTINGS, json!({})).await
    }

    async fn start(&self, project_id: &str, engine: &str, model: &str) -> Result<(), BackendError> {
        self.invoke_unit(
            ops::START,
            json!({ "project_id": project_id, "engine": engine, "model": model }),
        )
        .await
    }

    async fn stop(&self, project_id: &str) -> Result<(), BackendError> {
        self.invoke_unit(ops::STOP, json!({ "project_id": project_id }))
            .await
    }

    async fn delete_project(&self, project_id: &str) -> Result<(), BackendError> {
        self.invoke_unit(ops::DELETE_PROJECT, json!({ "project_id": project_id }))
            .await
    }

    async fn set_override(
        &self,
        project_id: &str,
        override_: &RuntimeOverride,
    ) -> Result<(), BackendError> {
        self.invoke_unit(
            ops::SET_OVERRIDE,
            json!({ "project_id": project_id, "override": override_ }),
        )
        .await
    }

    async fn toggle_library_item(
        &self,
        kind: CatalogKind,
        id: &str,
        enabled: bool,
    ) -> Result<(), BackendError> {
        self.invoke_unit(
            ops::TOGGLE_LIBRARY_ITEM,
            json!({ "kind": kind, "id": id, "enabled": enabled }),
        )
        .await
    }

    async fn add_custom_entity(&self, payload: &CustomPayload) -> Result<CatalogEntity, BackendError> {
        self.invoke(ops::ADD_CUSTOM_ENTITY, json!({ "payload": payload }))
            .await
    }

    async fn update_custom_entity(
        &self,
        id: &str,
        payload: &CustomPayload,
    ) -> Result<CatalogEntity, BackendError> {
        self.invoke(
            ops::UPDATE_CUSTOM_ENTITY,
            json!({ "id": id, "payload": payload }),
        )
        .await
    }

    async fn remove_custom_entity(&self, kind: CatalogKind, id: &str) -> Result<(), BackendError> {
        self.invoke_unit(ops::REMOVE_CUSTOM_ENTITY, json!({ "kind": kind, "id": id }))
            .await
    }

    async fn save_settings(&self, settings: &AppSettings) -> Result<(), BackendError> {
        self.invoke_unit(ops::SAVE_SETTINGS, json!({ "settings": settings }))
            .await
    }

    async fn add_provider(&self, provider: &AiProvider) -> Result<(), BackendError> {
        self.invoke_unit(ops::ADD_PROVIDER, json!({ "provider": provider }))
            .await
    }

    async fn remove_provider(&self, provider_id: &str) -> Result<(), BackendError> {
        self.invoke_unit(ops::REMOVE_PROVIDER, json!({ "provider_id": provider_id }))
            .await
    }
}

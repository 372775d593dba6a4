//! Side-effecting backend commands and the keys each one invalidates.

use super::queries::Query;
use crate::backend::{ops, validate_provider, Backend};
use crate::catalog::{CatalogEntity, CatalogKind, CustomPayload};
use crate::error::BackendError;
use crate::invalidation::MutationDescriptor;
use crate::overrides::RuntimeOverride;
use crate::types::{AiProvider, AppSettings};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start {
        project_id: String,
        engine: String,
        model: String,
    },
    Stop {
        project_id: String,
    },
    DeleteProject {
        project_id: String,
    },
    SetOverride {
        project_id: String,
        override_: RuntimeOverride,
    },
    ToggleLibraryItem {
        kind: CatalogKind,
        id: String,
        enabled: bool,
    },
    AddCustomEntity {
        payload: CustomPayload,
    },
    UpdateCustomEntity {
        id: String,
        payload: CustomPayload,
    },
    RemoveCustomEntity {
        kind: CatalogKind,
        id: String,
    },
    SaveSettings {
        settings: AppSettings,
    },
    AddProvider {
        provider: AiProvider,
    },
    RemoveProvider {
        provider_id: String,
    },
}

fn required(field: &str, value: &str) -> Result<(), BackendError> {
    if value.trim().is_empty() {
        return Err(BackendError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

impl Command {
    /// Operation name on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start { .. } => ops::START,
            Command::Stop { .. } => ops::STOP,
            Command::DeleteProject { .. } => ops::DELETE_PROJECT,
            Command::SetOverride { .. } => ops::SET_OVERRIDE,
            Command::ToggleLibraryItem { .. } => ops::TOGGLE_LIBRARY_ITEM,
            Command::AddCustomEntity { .. } => ops::ADD_CUSTOM_ENTITY,
            Command::UpdateCustomEntity { .. } => ops::UPDATE_CUSTOM_ENTITY,
            Command::RemoveCustomEntity { .. } => ops::REMOVE_CUSTOM_ENTITY,
            Command::SaveSettings { .. } => ops::SAVE_SETTINGS,
            Command::AddProvider { .. } => ops::ADD_PROVIDER,
            Command::RemoveProvider { .. } => ops::REMOVE_PROVIDER,
        }
    }

    /// Cached queries made stale when this command succeeds
    pub fn affected_keys(&self) -> MutationDescriptor {
        let queries = match self {
            Command::Start { project_id, .. }
            | Command::Stop { project_id }
            | Command::DeleteProject { project_id } => {
                vec![Query::status(project_id.as_str()), Query::Projects]
            }
            Command::SetOverride { project_id, .. } => vec![Query::Override(project_id.clone())],
            Command::ToggleLibraryItem { .. } => vec![Query::LibraryToggles],
            Command::AddCustomEntity { payload } | Command::UpdateCustomEntity { payload, .. } => {
                vec![Query::CustomCatalog(payload.kind())]
            }
            Command::RemoveCustomEntity { kind, .. } => vec![Query::CustomCatalog(*kind)],
            Command::SaveSettings { .. }
            | Command::AddProvider { .. }
            | Command::RemoveProvider { .. } => vec![Query::Settings],
        };
        MutationDescriptor::new(queries.iter().map(Query::key))
    }

    /// Input checks that never need the backend
    pub fn validate(&self) -> Result<(), BackendError> {
        match self {
            Command::Start {
                project_id,
                engine,
                model,
            } => {
                required("project id", project_id)?;
                required("engine", engine)?;
                required("model", model)
            }
            Command::Stop { project_id }
            | Command::DeleteProject { project_id }
            | Command::SetOverride { project_id, .. } => required("project id", project_id),
            Command::ToggleLibraryItem { id, .. } | Command::RemoveCustomEntity { id, .. } => {
                required("id", id)
            }
            Command::AddCustomEntity { payload } => payload.validate(),
            Command::UpdateCustomEntity { id, payload } => {
                required("id", id)?;
                payload.validate()
            }
            Command::SaveSettings { settings } => {
                required("default engine", &settings.default_engine)?;
                required("default model", &settings.default_model)?;
                if settings.max_daily_budget < 0.0 || settings.alert_at_budget < 0.0 {
                    return Err(BackendError::Validation(
                        "budgets cannot be negative".to_string(),
                    ));
                }
                Ok(())
            }
            Command::AddProvider { provider } => validate_provider(provider),
            Command::RemoveProvider { provider_id } => required("provider id", provider_id),
        }
    }

    /// Issue the command. Returns the stored entity for add/update.
    pub(crate) async fn dispatch(
        &self,
        backend: &dyn Backend,
    ) -> Result<Option<CatalogEntity>, BackendError> {
        match self {
            Command::Start {
                project_id,
                engine,
                model,
            } => backend.start(project_id, engine, model).await.map(|_| None),
            Command::Stop { project_id } => backend.stop(project_id).await.map(|_| None),
            Command::DeleteProject { project_id } => {
                backend.delete_project(project_id).await.map(|_| None)
            }
            Command::SetOverride {
                project_id,
                override_,
            } => backend.set_override(project_id, override_).await.map(|_| None),
            Command::ToggleLibraryItem { kind, id, enabled } => backend
                .toggle_library_item(*kind, id, *enabled)
                .await
                .map(|_| None),
            Command::AddCustomEntity { payload } => backend.add_custom_entity(payload).await.map(Some),
            Command::UpdateCustomEntity { id, payload } => {
                backend.update_custom_entity(id, payload).await.map(Some)
            }
            Command::RemoveCustomEntity { kind, id } => {
                backend.remove_custom_entity(*kind, id).await.map(|_| None)
            }
            Command::SaveSettings { settings } => backend.save_settings(settings).await.map(|_| None),
            Command::AddProvider { provider } => backend.add_provider(provider).await.map(|_| None),
            Command::RemoveProvider { provider_id } => {
                backend.remove_provider(provider_id).await.map(|_| None)
            }
        }
    }
}

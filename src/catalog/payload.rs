//! User-defined entity payloads and their validation.

use super::{CatalogEntity, CatalogKind};
use crate::error::BackendError;
use crate::types::{PersonaInfo, SkillInfo, WorkflowInfo};
use serde::{Deserialize, Serialize};

const CUSTOM_PREFIX: &str = "custom:";
const PREVIEW_CHARS: usize = 200;

/// Lowercase, spaces to dashes, anything else non-alphanumeric removed
pub fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .replace(' ', "-")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-')
        .collect()
}

pub fn custom_id(slug: &str) -> String {
    format!("{}{}", CUSTOM_PREFIX, slug)
}

fn required(field: &str, value: &str) -> Result<(), BackendError> {
    if value.trim().is_empty() {
        return Err(BackendError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPersona {
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub expertise: String,
    #[serde(default)]
    pub mental_models: Vec<String>,
    #[serde(default)]
    pub core_capabilities: Vec<String>,
    #[serde(default)]
    pub layer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSkill {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewWorkflow {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub chain: Vec<String>,
    pub convergence_cycles: u32,
}

/// Body of an add/update custom entity command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CustomPayload {
    Persona(NewPersona),
    Skill(NewSkill),
    Workflow(NewWorkflow),
}

impl CustomPayload {
    pub fn kind(&self) -> CatalogKind {
        match self {
            CustomPayload::Persona(_) => CatalogKind::Persona,
            CustomPayload::Skill(_) => CatalogKind::Skill,
            CustomPayload::Workflow(_) => CatalogKind::Workflow,
        }
    }

    /// Reject malformed input before it reaches the backend
    pub fn validate(&self) -> Result<(), BackendError> {
        match self {
            CustomPayload::Persona(p) => {
                required("name", &p.name)?;
                required("role", &p.role)
            }
            CustomPayload::Skill(s) => required("name", &s.name),
            CustomPayload::Workflow(w) => {
                required("name", &w.name)?;
                if w.chain.iter().all(|step| step.trim().is_empty()) {
                    return Err(BackendError::Validation(
                        "workflow chain must name at least one persona".to_string(),
                    ));
                }
                if w.convergence_cycles == 0 {
                    return Err(BackendError::Validation(
                        "convergence_cycles must be at least 1".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Slug the entity would be stored under
    pub fn slug(&self) -> String {
        match self {
            CustomPayload::Persona(p) => slugify(&format!("{} {}", p.role, p.name)),
            CustomPayload::Skill(s) => slugify(&s.name),
            CustomPayload::Workflow(w) => slugify(&w.name),
        }
    }

    /// Build the catalog entity stored under `id`
    pub fn into_entity(self, id: String) -> CatalogEntity {
        match self {
            CustomPayload::Persona(p) => CatalogEntity::Persona(PersonaInfo {
                id,
                name: p.name,
                role: p.role,
                expertise: p.expertise,
                mental_models: p.mental_models,
                core_capabilities: p.core_capabilities,
                tags: if p.layer.is_empty() { vec![] } else { vec![p.layer] },
            }),
            CustomPayload::Skill(s) => CatalogEntity::Skill(SkillInfo {
                id,
                name: s.name,
                category: s.category,
                description: s.description,
                content_preview: s.content.chars().take(PREVIEW_CHARS).collect(),
                tags: vec![],
            }),
            CustomPayload::Workflow(w) => CatalogEntity::Workflow(WorkflowInfo {
                id,
                name: w.name,
                description: w.description,
                chain: w.chain.into_iter().filter(|s| !s.trim().is_empty()).collect(),
                convergence_cycles: w.convergence_cycles,
                tags: vec![],
            }),
        }
    }
}

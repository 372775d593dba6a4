//! Catalog of personas, skills and workflows.
//!
//! The backend serves a built-in ("base") list and a user-defined ("custom")
//! list per kind; [`merge`] folds them into the one list the library shows,
//! and [`LibraryToggleState`] flags disabled entries without removing them.

pub mod merge;
pub mod payload;
pub mod toggles;

pub use merge::{merge, merge_tagged, Sourced};
pub use payload::{custom_id, slugify, CustomPayload, NewPersona, NewSkill, NewWorkflow};
pub use toggles::{apply_toggles, LibraryToggleState};

use crate::types::{PersonaInfo, SkillInfo, WorkflowInfo};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entity kind discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogKind {
    Persona,
    Skill,
    Workflow,
}

impl CatalogKind {
    pub const ALL: [CatalogKind; 3] = [CatalogKind::Persona, CatalogKind::Skill, CatalogKind::Workflow];

    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogKind::Persona => "persona",
            CatalogKind::Skill => "skill",
            CatalogKind::Workflow => "workflow",
        }
    }
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown catalog kind: {0} (expected persona, skill or workflow)")]
pub struct ParseCatalogKindError(String);

impl FromStr for CatalogKind {
    type Err = ParseCatalogKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "persona" | "personas" | "agent" | "agents" => Ok(CatalogKind::Persona),
            "skill" | "skills" => Ok(CatalogKind::Skill),
            "workflow" | "workflows" => Ok(CatalogKind::Workflow),
            other => Err(ParseCatalogKindError(other.to_string())),
        }
    }
}

/// Where a merged entity came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntitySource {
    Base,
    Custom,
}

/// Anything with a catalog id
pub trait CatalogRecord {
    fn id(&self) -> &str;
}

impl CatalogRecord for PersonaInfo {
    fn id(&self) -> &str {
        &self.id
    }
}

impl CatalogRecord for SkillInfo {
    fn id(&self) -> &str {
        &self.id
    }
}

impl CatalogRecord for WorkflowInfo {
    fn id(&self) -> &str {
        &self.id
    }
}

/// One catalog entity of any kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CatalogEntity {
    Persona(PersonaInfo),
    Skill(SkillInfo),
    Workflow(WorkflowInfo),
}

impl CatalogEntity {
    pub fn kind(&self) -> CatalogKind {
        match self {
            CatalogEntity::Persona(_) => CatalogKind::Persona,
            CatalogEntity::Skill(_) => CatalogKind::Skill,
            CatalogEntity::Workflow(_) => CatalogKind::Workflow,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CatalogEntity::Persona(p) => &p.name,
            CatalogEntity::Skill(s) => &s.name,
            CatalogEntity::Workflow(w) => &w.name,
        }
    }

    /// Short secondary text for listings
    pub fn summary(&self) -> &str {
        match self {
            CatalogEntity::Persona(p) => &p.role,
            CatalogEntity::Skill(s) => &s.category,
            CatalogEntity::Workflow(w) => &w.description,
        }
    }
}

impl CatalogRecord for CatalogEntity {
    fn id(&self) -> &str {
        match self {
            CatalogEntity::Persona(p) => &p.id,
            CatalogEntity::Skill(s) => &s.id,
            CatalogEntity::Workflow(w) => &w.id,
        }
    }
}

//! Library enable/disable flags.

use super::{CatalogKind, CatalogRecord, Sourced};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Disabled ids per kind, as stored by the backend.
///
/// Disabling never removes an entity from the merged list; it only flips its
/// `enabled` flag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryToggleState {
    #[serde(default)]
    pub disabled_personas: BTreeSet<String>,
    #[serde(default)]
    pub disabled_skills: BTreeSet<String>,
    #[serde(default)]
    pub disabled_workflows: BTreeSet<String>,
}

impl LibraryToggleState {
    pub fn disabled(&self, kind: CatalogKind) -> &BTreeSet<String> {
        match kind {
            CatalogKind::Persona => &self.disabled_personas,
            CatalogKind::Skill => &self.disabled_skills,
            CatalogKind::Workflow => &self.disabled_workflows,
        }
    }

    fn disabled_mut(&mut self, kind: CatalogKind) -> &mut BTreeSet<String> {
        match kind {
            CatalogKind::Persona => &mut self.disabled_personas,
            CatalogKind::Skill => &mut self.disabled_skills,
            CatalogKind::Workflow => &mut self.disabled_workflows,
        }
    }

    pub fn is_enabled(&self, kind: CatalogKind, id: &str) -> bool {
        !self.disabled(kind).contains(id)
    }

    pub fn set_enabled(&mut self, kind: CatalogKind, id: &str, enabled: bool) {
        let disabled = self.disabled_mut(kind);
        if enabled {
            disabled.remove(id);
        } else {
            disabled.insert(id.to_string());
        }
    }
}

/// Set each entity's `enabled` flag from the toggle state
pub fn apply_toggles<E: CatalogRecord>(
    kind: CatalogKind,
    items: &mut [Sourced<E>],
    toggles: &LibraryToggleState,
) {
    for sourced in items {
        sourced.enabled = toggles.is_enabled(kind, sourced.item.id());
    }
}

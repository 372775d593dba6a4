//! Command Index
//!
//! One flat list of fixed destinations followed by one entry per known
//! project, filtered by case-insensitive substring on the label. The
//! [`CommandPalette`] keeps the query text and selection index; the index is
//! clamped to the filtered list and never wraps.

use crate::types::Project;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandCategory {
    Navigation,
    Project,
}

/// What activating an item does
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CommandTarget {
    Route(String),
    Project(String),
}

impl fmt::Display for CommandTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandTarget::Route(route) => write!(f, "{}", route),
            CommandTarget::Project(id) => write!(f, "/project/{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandItem {
    pub id: String,
    pub label: String,
    pub target: CommandTarget,
    pub category: CommandCategory,
}

const DESTINATIONS: [(&str, &str, &str); 4] = [
    ("nav:dashboard", "Dashboard", "/"),
    ("nav:new-project", "New Project", "/new"),
    ("nav:library", "Library", "/library"),
    ("nav:settings", "Settings", "/settings"),
];

pub fn destinations() -> Vec<CommandItem> {
    DESTINATIONS
        .iter()
        .map(|(id, label, route)| CommandItem {
            id: id.to_string(),
            label: label.to_string(),
            target: CommandTarget::Route(route.to_string()),
            category: CommandCategory::Navigation,
        })
        .collect()
}

/// Destinations first, then one item per project in the given order
pub fn build_index(projects: &[Project]) -> Vec<CommandItem> {
    let mut items = destinations();
    items.extend(projects.iter().map(|project| CommandItem {
        id: format!("project:{}", project.id),
        label: project.name.clone(),
        target: CommandTarget::Project(project.id.clone()),
        category: CommandCategory::Project,
    }));
    items
}

/// Items whose label contains `query`, ignoring case; all items when empty
pub fn filter<'a>(items: &'a [CommandItem], query: &str) -> Vec<&'a CommandItem> {
    let needle = query.to_lowercase();
    if needle.is_empty() {
        return items.iter().collect();
    }
    items
        .iter()
        .filter(|item| item.label.to_lowercase().contains(&needle))
        .collect()
}

/// Keyboard-driven palette state
#[derive(Debug, Clone, Default)]
pub struct CommandPalette {
    items: Vec<CommandItem>,
    query: String,
    selected: usize,
    open: bool,
}

impl CommandPalette {
    pub fn new(items: Vec<CommandItem>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn open(&mut self) {
        self.open = true;
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    /// Replace the item list (e.g. after the project list refreshed)
    pub fn set_items(&mut self, items: Vec<CommandItem>) {
        self.items = items;
        self.clamp();
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.selected = 0;
    }

    pub fn visible(&self) -> Vec<&CommandItem> {
        filter(&self.items, &self.query)
    }

    pub fn move_down(&mut self) {
        let len = self.visible().len();
        if self.selected + 1 < len {
            self.selected += 1;
        }
    }

    pub fn move_up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    /// Target of the item at `index` in the filtered list.
    ///
    /// Out-of-range or empty: `None` and the palette stays as it is.
    /// Otherwise the palette closes.
    pub fn activate(&mut self, index: usize) -> Option<CommandTarget> {
        let target = self.visible().get(index).map(|item| item.target.clone())?;
        self.close();
        Some(target)
    }

    pub fn activate_selected(&mut self) -> Option<CommandTarget> {
        self.activate(self.selected)
    }

    pub fn close(&mut self) {
        self.open = false;
        self.query.clear();
        self.selected = 0;
    }

    fn clamp(&mut self) {
        let len = self.visible().len();
        self.selected = self.selected.min(len.saturating_sub(1));
    }
}

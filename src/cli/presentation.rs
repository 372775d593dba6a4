//! CLI presentation: tables and status lines for each command.

use crate::catalog::{CatalogEntity, CatalogKind, CatalogRecord, EntitySource, Sourced};
use crate::overrides::{ConfigSource, ResolvedRuntimeConfig};
use crate::palette::{CommandCategory, CommandItem};
use crate::types::{Project, RuntimeStatus};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;

/// Section heading with bold/underline.
pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

pub fn format_projects_table(projects: &[Project]) -> String {
    if projects.is_empty() {
        return "No projects found.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["ID", "Name", "Status", "Agents", "Cycles", "Last active"]);
    for project in projects {
        table.add_row(vec![
            project.id.clone(),
            project.name.clone(),
            project.status.as_str().to_string(),
            project.agent_count.to_string(),
            project.cycle_count.to_string(),
            project.last_active_at.clone(),
        ]);
    }
    format!(
        "{}\n\n{}\n\nTotal: {} project(s)",
        format_section_heading("Projects"),
        table,
        projects.len()
    )
}

pub fn format_catalog_table(kind: CatalogKind, entries: &[Sourced<CatalogEntity>]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["ID", "Name", "Summary", "Source", "Enabled"]);
    for entry in entries {
        let source = match entry.source {
            EntitySource::Base => "base",
            EntitySource::Custom => "custom",
        };
        let enabled = if entry.enabled {
            format!("{}", "yes".green())
        } else {
            format!("{}", "no".red())
        };
        table.add_row(vec![
            entry.item.id().to_string(),
            entry.item.name().to_string(),
            entry.item.summary().to_string(),
            source.to_string(),
            enabled,
        ]);
    }
    format!(
        "{}\n\n{}",
        format_section_heading(&format!("Library: {}", kind)),
        table
    )
}

pub fn format_palette(query: &str, items: &[&CommandItem]) -> String {
    if items.is_empty() {
        return format!("No commands match '{}'.", query);
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["#", "Label", "Category", "Target"]);
    for (index, item) in items.iter().enumerate() {
        let category = match item.category {
            CommandCategory::Navigation => "navigation",
            CommandCategory::Project => "project",
        };
        table.add_row(vec![
            (index + 1).to_string(),
            item.label.clone(),
            category.to_string(),
            item.target.to_string(),
        ]);
    }
    table.to_string()
}

pub fn format_resolved_runtime(project_id: &str, resolved: &ResolvedRuntimeConfig) -> String {
    let source = match resolved.source {
        ConfigSource::Project => format!("{}", "project override".yellow()),
        ConfigSource::Global => "global settings".to_string(),
    };
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.add_row(vec!["Engine".to_string(), resolved.engine.clone()]);
    table.add_row(vec!["Model tier".to_string(), resolved.model_tier.clone()]);
    table.add_row(vec!["Model".to_string(), resolved.resolved_model.clone()]);
    table.add_row(vec!["Provider".to_string(), resolved.provider_name.clone()]);
    table.add_row(vec!["Provider type".to_string(), resolved.provider_type.clone()]);
    table.add_row(vec!["Base URL".to_string(), resolved.api_base_url.clone()]);
    table.add_row(vec!["API key".to_string(), resolved.api_key_preview.clone()]);
    table.add_row(vec!["Source".to_string(), source]);
    format!(
        "{}\n\n{}",
        format_section_heading(&format!("Runtime for {}", project_id)),
        table
    )
}

/// One status update for `watch`
pub fn format_status_line(project_id: &str, status: &RuntimeStatus) -> String {
    let state = if status.is_running {
        format!("{}", "running".green())
    } else {
        format!("{}", "idle".dimmed())
    };
    let mut line = format!(
        "{} {} cycle {}/{}",
        project_id.bold(),
        state,
        status.current_cycle,
        status.total_cycles
    );
    if status.consecutive_errors > 0 {
        line.push_str(&format!(
            " {}",
            format!("errors: {}", status.consecutive_errors).red()
        ));
    }
    line
}

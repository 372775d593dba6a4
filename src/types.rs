//! Values exchanged with the process-management backend.
//!
//! Field names follow the backend's JSON so these round-trip through
//! `serde_json` unchanged.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle state of a project's loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Initializing,
    Running,
    Paused,
    Stopped,
    Error,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Initializing => "initializing",
            ProjectStatus::Running => "running",
            ProjectStatus::Paused => "paused",
            ProjectStatus::Stopped => "stopped",
            ProjectStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub seed_prompt: String,
    pub output_dir: String,
    pub created_at: String,
    pub last_active_at: String,
    pub status: ProjectStatus,
    pub agent_count: usize,
    pub cycle_count: u32,
}

/// Live state of the loop process for one project
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeStatus {
    pub is_running: bool,
    pub pid: Option<u32>,
    pub current_cycle: u32,
    pub total_cycles: u32,
    pub consecutive_errors: u32,
    pub last_cycle_at: Option<String>,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleResult {
    pub cycle_number: u32,
    pub started_at: String,
    pub completed_at: String,
    pub agent_role: String,
    pub action: String,
    pub outcome: String,
    pub files_changed: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusState {
    pub company_name: String,
    pub mission: String,
    pub status: ProjectStatus,
    pub cycle: u32,
    pub revenue: String,
    pub current_focus: String,
    pub active_projects: Vec<String>,
    pub next_action: String,
    pub raw_content: String,
}

/// Activity feed item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectEvent {
    pub id: String,
    pub timestamp: String,
    pub event_type: String,
    pub agent: String,
    pub summary: String,
    #[serde(default)]
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiProvider {
    pub id: String,
    pub name: String,
    pub provider_type: String,
    pub api_key: String,
    pub api_base_url: String,
    pub default_model: String,
    pub enabled: bool,
    #[serde(default)]
    pub is_healthy: bool,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default = "default_provider_engine")]
    pub engine: String,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
}

fn default_provider_engine() -> String {
    "claude".to_string()
}

impl AiProvider {
    pub fn is_claude(&self) -> bool {
        self.provider_type == "anthropic" || self.provider_type == "claude-code"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    pub default_engine: String,
    pub default_model: String,
    pub max_daily_budget: f64,
    pub alert_at_budget: f64,
    pub loop_interval: u32,
    pub cycle_timeout: u32,
    pub projects_dir: String,
    #[serde(default)]
    pub providers: Vec<AiProvider>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_theme")]
    pub theme: String,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_theme() -> String {
    "obsidian".to_string()
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            default_engine: "claude".to_string(),
            default_model: "sonnet".to_string(),
            max_daily_budget: 50.0,
            alert_at_budget: 30.0,
            loop_interval: 30,
            cycle_timeout: 1800,
            projects_dir: "projects".to_string(),
            providers: Vec::new(),
            language: default_language(),
            theme: default_theme(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaInfo {
    pub id: String,
    pub name: String,
    pub role: String,
    pub expertise: String,
    #[serde(default)]
    pub mental_models: Vec<String>,
    #[serde(default)]
    pub core_capabilities: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillInfo {
    pub id: String,
    pub name: String,
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub content_preview: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub chain: Vec<String>,
    pub convergence_cycles: u32,
    #[serde(default)]
    pub tags: Vec<String>,
}

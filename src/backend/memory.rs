//! In-process backend.
//!
//! Holds every piece of backend state in memory and enforces the same input
//! rules as the real command handlers. Tests use [`MemoryBackend::fail_next`]
//! to inject failures, [`MemoryBackend::set_latency`] to hold responses open
//! and [`MemoryBackend::calls`] to count requests.

use super::{ops, validate_provider, Backend};
use crate::catalog::{
    custom_id, CatalogEntity, CatalogKind, CatalogRecord, CustomPayload, LibraryToggleState,
};
use crate::error::BackendError;
use crate::overrides::RuntimeOverride;
use crate::types::{
    AiProvider, AppSettings, ConsensusState, CycleResult, PersonaInfo, Project, ProjectEvent,
    ProjectStatus, RuntimeStatus, SkillInfo, WorkflowInfo,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

#[derive(Default)]
struct MemoryState {
    projects: Vec<Project>,
    runtime: HashMap<String, RuntimeStatus>,
    cycles: HashMap<String, Vec<CycleResult>>,
    logs: HashMap<String, Vec<String>>,
    events: HashMap<String, Vec<ProjectEvent>>,
    consensus: HashMap<String, ConsensusState>,
    base: BTreeMap<CatalogKind, Vec<CatalogEntity>>,
    custom: BTreeMap<CatalogKind, Vec<CatalogEntity>>,
    overrides: HashMap<String, RuntimeOverride>,
    toggles: LibraryToggleState,
    settings: AppSettings,
}

impl MemoryState {
    fn project_mut(&mut self, project_id: &str) -> Result<&mut Project, BackendError> {
        self.projects
            .iter_mut()
            .find(|p| p.id == project_id)
            .ok_or_else(|| BackendError::NotFound(format!("project '{}'", project_id)))
    }

    fn require_project(&self, project_id: &str) -> Result<(), BackendError> {
        if self.projects.iter().any(|p| p.id == project_id) {
            Ok(())
        } else {
            Err(BackendError::NotFound(format!("project '{}'", project_id)))
        }
    }

    fn log(&mut self, project_id: &str, line: String) {
        self.logs
            .entry(project_id.to_string())
            .or_default()
            .push(format!("[{}] {}", Utc::now().to_rfc3339(), line));
    }

    fn event(&mut self, project_id: &str, event_type: &str, summary: String) {
        let events = self.events.entry(project_id.to_string()).or_default();
        let id = format!("evt-{}", events.len() + 1);
        events.push(ProjectEvent {
            id,
            timestamp: Utc::now().to_rfc3339(),
            event_type: event_type.to_string(),
            agent: "system".to_string(),
            summary,
            details: String::new(),
        });
    }
}

#[derive(Default)]
struct Control {
    calls: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, VecDeque<BackendError>>,
    latency: Option<Duration>,
}

/// Backend kept entirely in memory
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    control: Mutex<Control>,
    next_pid: AtomicU32,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-loaded with the built-in catalog
    pub fn with_builtin_catalog() -> Self {
        let backend = Self::new();
        {
            let mut state = backend.state.lock();
            state.base = builtin_catalog();
        }
        backend
    }

    /// Built-in catalog, one demo project and an Anthropic provider
    pub fn demo() -> Self {
        let backend = Self::with_builtin_catalog();
        backend.add_project("acme", "Acme Robotics");
        backend.set_consensus(
            "acme",
            ConsensusState {
                company_name: "Acme Robotics".to_string(),
                mission: "Ship a warehouse robot fleet manager".to_string(),
                status: ProjectStatus::Stopped,
                cycle: 0,
                revenue: "$0".to_string(),
                current_focus: "Market research".to_string(),
                active_projects: vec!["fleet-dashboard".to_string()],
                next_action: "Interview three warehouse operators".to_string(),
                raw_content: String::new(),
            },
        );
        {
            let mut state = backend.state.lock();
            state.settings.providers.push(AiProvider {
                id: "anthropic".to_string(),
                name: "Anthropic".to_string(),
                provider_type: "anthropic".to_string(),
                api_key: "sk-ant-demo-0000000000".to_string(),
                api_base_url: "https://api.anthropic.com".to_string(),
                default_model: "sonnet".to_string(),
                enabled: true,
                is_healthy: true,
                last_error: None,
                engine: "claude".to_string(),
                extra_headers: HashMap::new(),
            });
        }
        backend
    }

    pub fn add_project(&self, id: &str, name: &str) {
        let now = Utc::now().to_rfc3339();
        let mut state = self.state.lock();
        state.projects.push(Project {
            id: id.to_string(),
            name: name.to_string(),
            seed_prompt: String::new(),
            output_dir: format!("projects/{}", id),
            created_at: now.clone(),
            last_active_at: now,
            status: ProjectStatus::Stopped,
            agent_count: 0,
            cycle_count: 0,
        });
        state.runtime.insert(id.to_string(), RuntimeStatus::default());
    }

    pub fn set_consensus(&self, project_id: &str, consensus: ConsensusState) {
        self.state
            .lock()
            .consensus
            .insert(project_id.to_string(), consensus);
    }

    pub fn push_cycle(&self, project_id: &str, cycle: CycleResult) {
        let mut state = self.state.lock();
        state
            .cycles
            .entry(project_id.to_string())
            .or_default()
            .push(cycle);
        if let Some(runtime) = state.runtime.get_mut(project_id) {
            runtime.total_cycles += 1;
            runtime.current_cycle += 1;
        }
    }

    pub fn push_log(&self, project_id: &str, line: &str) {
        self.state.lock().log(project_id, line.to_string());
    }

    pub fn set_settings(&self, settings: AppSettings) {
        self.state.lock().settings = settings;
    }

    /// Make the next call to `op` fail with `error`. Multiple injections
    /// for the same op queue up in order.
    pub fn fail_next(&self, op: &'static str, error: BackendError) {
        self.control
            .lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Delay every response by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.control.lock().latency = latency;
    }

    /// Requests received for `op`, including failed ones
    pub fn calls(&self, op: &str) -> usize {
        self.control.lock().calls.get(op).copied().unwrap_or(0)
    }

    async fn enter(&self, op: &'static str) -> Result<(), BackendError> {
        let (latency, injected) = {
            let mut control = self.control.lock();
            *control.calls.entry(op).or_default() += 1;
            let injected = control.failures.get_mut(op).and_then(VecDeque::pop_front);
            (control.latency, injected)
        };
        if let Some(latency) = latency {
            sleep(latency).await;
        }
        match injected {
            Some(error) => {
                debug!(op, error = %error, "Injected backend failure");
                Err(error)
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn status(&self, project_id: &str) -> Result<RuntimeStatus, BackendError> {
        self.enter(ops::STATUS).await?;
        let state = self.state.lock();
        state.require_project(project_id)?;
        Ok(state.runtime.get(project_id).cloned().unwrap_or_default())
    }

    async fn cycle_history(&self, project_id: &str) -> Result<Vec<CycleResult>, BackendError> {
        self.enter(ops::CYCLE_HISTORY).await?;
        let state = self.state.lock();
        state.require_project(project_id)?;
        Ok(state.cycles.get(project_id).cloned().unwrap_or_default())
    }

    async fn tail_log(&self, project_id: &str, lines: u32) -> Result<Vec<String>, BackendError> {
        self.enter(ops::TAIL_LOG).await?;
        let state = self.state.lock();
        state.require_project(project_id)?;
        let log = state.logs.get(project_id).map(Vec::as_slice).unwrap_or(&[]);
        let skip = log.len().saturating_sub(lines as usize);
        Ok(log[skip..].to_vec())
    }

    async fn consensus(&self, project_id: &str) -> Result<ConsensusState, BackendError> {
        self.enter(ops::CONSENSUS).await?;
        let state = self.state.lock();
        state.require_project(project_id)?;
        state
            .consensus
            .get(project_id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("consensus for '{}'", project_id)))
    }

    async fn events(&self, project_id: &str, limit: u32) -> Result<Vec<ProjectEvent>, BackendError> {
        self.enter(ops::EVENTS).await?;
        let state = self.state.lock();
        state.require_project(project_id)?;
        // Newest first
        Ok(state
            .events
            .get(project_id)
            .map(|events| events.iter().rev().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn list_projects(&self) -> Result<Vec<Project>, BackendError> {
        self.enter(ops::LIST_PROJECTS).await?;
        Ok(self.state.lock().projects.clone())
    }

    async fn list_catalog(&self, kind: CatalogKind) -> Result<Vec<CatalogEntity>, BackendError> {
        self.enter(ops::LIST_CATALOG).await?;
        Ok(self.state.lock().base.get(&kind).cloned().unwrap_or_default())
    }

    async fn list_custom_catalog(&self, kind: CatalogKind) -> Result<Vec<CatalogEntity>, BackendError> {
        self.enter(ops::LIST_CUSTOM_CATALOG).await?;
        Ok(self.state.lock().custom.get(&kind).cloned().unwrap_or_default())
    }

    async fn get_override(&self, project_id: &str) -> Result<RuntimeOverride, BackendError> {
        self.enter(ops::GET_OVERRIDE).await?;
        let state = self.state.lock();
        state.require_project(project_id)?;
        Ok(state.overrides.get(project_id).cloned().unwrap_or_default())
    }

    async fn library_toggles(&self) -> Result<LibraryToggleState, BackendError> {
        self.enter(ops::GET_LIBRARY_TOGGLES).await?;
        Ok(self.state.lock().toggles.clone())
    }

    async fn settings(&self) -> Result<AppSettings, BackendError> {
        self.enter(ops::GET_SETTINGS).await?;
        Ok(self.state.lock().settings.clone())
    }

    async fn start(&self, project_id: &str, engine: &str, model: &str) -> Result<(), BackendError> {
        self.enter(ops::START).await?;
        if engine.trim().is_empty() {
            return Err(BackendError::Validation("engine is required".to_string()));
        }
        let pid = 4000 + self.next_pid.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();
        let project = state.project_mut(project_id)?;
        if project.status == ProjectStatus::Running {
            return Err(BackendError::Rejected(format!(
                "loop for '{}' is already running",
                project_id
            )));
        }
        project.status = ProjectStatus::Running;
        project.last_active_at = Utc::now().to_rfc3339();

        let runtime = state.runtime.entry(project_id.to_string()).or_default();
        runtime.is_running = true;
        runtime.pid = Some(pid);
        runtime.consecutive_errors = 0;
        runtime.uptime_seconds = 0;

        state.log(project_id, format!("Loop started (engine={}, model={})", engine, model));
        state.event(project_id, "loop_started", format!("Started with {} / {}", engine, model));
        Ok(())
    }

    async fn stop(&self, project_id: &str) -> Result<(), BackendError> {
        self.enter(ops::STOP).await?;
        let mut state = self.state.lock();
        let project = state.project_mut(project_id)?;
        if project.status != ProjectStatus::Running {
            return Ok(());
        }
        project.status = ProjectStatus::Stopped;
        if let Some(runtime) = state.runtime.get_mut(project_id) {
            runtime.is_running = false;
            runtime.pid = None;
        }
        state.log(project_id, "Loop stopped".to_string());
        state.event(project_id, "loop_stopped", "Stopped by user".to_string());
        Ok(())
    }

    async fn delete_project(&self, project_id: &str) -> Result<(), BackendError> {
        self.enter(ops::DELETE_PROJECT).await?;
        let mut state = self.state.lock();
        let project = state.project_mut(project_id)?;
        if project.status == ProjectStatus::Running {
            return Err(BackendError::Rejected(format!(
                "stop the loop for '{}' before deleting it",
                project_id
            )));
        }
        state.projects.retain(|p| p.id != project_id);
        state.runtime.remove(project_id);
        state.cycles.remove(project_id);
        state.logs.remove(project_id);
        state.events.remove(project_id);
        state.consensus.remove(project_id);
        state.overrides.remove(project_id);
        Ok(())
    }

    async fn set_override(
        &self,
        project_id: &str,
        override_: &RuntimeOverride,
    ) -> Result<(), BackendError> {
        self.enter(ops::SET_OVERRIDE).await?;
        let mut state = self.state.lock();
        state.require_project(project_id)?;
        if override_.is_empty() {
            state.overrides.remove(project_id);
        } else {
            state
                .overrides
                .insert(project_id.to_string(), override_.clone());
        }
        Ok(())
    }

    async fn toggle_library_item(
        &self,
        kind: CatalogKind,
        id: &str,
        enabled: bool,
    ) -> Result<(), BackendError> {
        self.enter(ops::TOGGLE_LIBRARY_ITEM).await?;
        self.state.lock().toggles.set_enabled(kind, id, enabled);
        Ok(())
    }

    async fn add_custom_entity(&self, payload: &CustomPayload) -> Result<CatalogEntity, BackendError> {
        self.enter(ops::ADD_CUSTOM_ENTITY).await?;
        payload.validate()?;
        let kind = payload.kind();
        let id = custom_id(&payload.slug());
        let mut state = self.state.lock();
        let entries = state.custom.entry(kind).or_default();
        if entries.iter().any(|e| e.id() == id) {
            return Err(BackendError::Validation(format!("{} '{}' already exists", kind, id)));
        }
        let entity = payload.clone().into_entity(id);
        entries.push(entity.clone());
        Ok(entity)
    }

    async fn update_custom_entity(
        &self,
        id: &str,
        payload: &CustomPayload,
    ) -> Result<CatalogEntity, BackendError> {
        self.enter(ops::UPDATE_CUSTOM_ENTITY).await?;
        payload.validate()?;
        let kind = payload.kind();
        let mut state = self.state.lock();
        let slot = state
            .custom
            .get_mut(&kind)
            .and_then(|entries| entries.iter_mut().find(|e| e.id() == id))
            .ok_or_else(|| BackendError::NotFound(format!("custom {} '{}'", kind, id)))?;
        let entity = payload.clone().into_entity(id.to_string());
        *slot = entity.clone();
        Ok(entity)
    }

    async fn remove_custom_entity(&self, kind: CatalogKind, id: &str) -> Result<(), BackendError> {
        self.enter(ops::REMOVE_CUSTOM_ENTITY).await?;
        let mut state = self.state.lock();
        let entries = state.custom.entry(kind).or_default();
        let before = entries.len();
        entries.retain(|e| e.id() != id);
        if entries.len() == before {
            return Err(BackendError::NotFound(format!("custom {} '{}'", kind, id)));
        }
        Ok(())
    }

    async fn save_settings(&self, settings: &AppSettings) -> Result<(), BackendError> {
        self.enter(ops::SAVE_SETTINGS).await?;
        if settings.default_engine.trim().is_empty() {
            return Err(BackendError::Validation("default engine is required".to_string()));
        }
        self.state.lock().settings = settings.clone();
        Ok(())
    }

    async fn add_provider(&self, provider: &AiProvider) -> Result<(), BackendError> {
        self.enter(ops::ADD_PROVIDER).await?;
        validate_provider(provider)?;
        let mut state = self.state.lock();
        if state.settings.providers.iter().any(|p| p.id == provider.id) {
            return Err(BackendError::Validation(format!(
                "provider '{}' already exists",
                provider.id
            )));
        }
        state.settings.providers.push(provider.clone());
        Ok(())
    }

    async fn remove_provider(&self, provider_id: &str) -> Result<(), BackendError> {
        self.enter(ops::REMOVE_PROVIDER).await?;
        let mut state = self.state.lock();
        let before = state.settings.providers.len();
        state.settings.providers.retain(|p| p.id != provider_id);
        if state.settings.providers.len() == before {
            return Err(BackendError::NotFound(format!("provider '{}'", provider_id)));
        }
        Ok(())
    }
}

fn persona(id: &str, name: &str, role: &str, expertise: &str) -> CatalogEntity {
    CatalogEntity::Persona(PersonaInfo {
        id: id.to_string(),
        name: name.to_string(),
        role: role.to_string(),
        expertise: expertise.to_string(),
        mental_models: vec![],
        core_capabilities: vec![],
        tags: vec![],
    })
}

fn skill(id: &str, name: &str, category: &str, description: &str) -> CatalogEntity {
    CatalogEntity::Skill(SkillInfo {
        id: id.to_string(),
        name: name.to_string(),
        category: category.to_string(),
        description: description.to_string(),
        content_preview: String::new(),
        tags: vec![],
    })
}

fn builtin_catalog() -> BTreeMap<CatalogKind, Vec<CatalogEntity>> {
    let mut catalog = BTreeMap::new();
    catalog.insert(
        CatalogKind::Persona,
        vec![
            persona("ceo-bezos", "Jeff Bezos", "CEO", "Customer obsession, long-term bets"),
            persona("cto-vogels", "Werner Vogels", "CTO", "Distributed systems"),
            persona("product-norman", "Don Norman", "Product", "Human-centered design"),
            persona("critic-munger", "Charlie Munger", "Critic", "Inversion, incentives"),
        ],
    );
    catalog.insert(
        CatalogKind::Skill,
        vec![
            skill("code-review", "Code Review", "engineering", "Review diffs for defects"),
            skill("tdd", "Test-Driven Development", "engineering", "Red, green, refactor"),
            skill("market-research", "Market Research", "business", "Size and segment a market"),
        ],
    );
    catalog.insert(
        CatalogKind::Workflow,
        vec![CatalogEntity::Workflow(WorkflowInfo {
            id: "ship-feature".to_string(),
            name: "Ship Feature".to_string(),
            description: "Plan, build, review and release one feature".to_string(),
            chain: vec![
                "product-norman".to_string(),
                "cto-vogels".to_string(),
                "critic-munger".to_string(),
            ],
            convergence_cycles: 2,
            tags: vec![],
        })],
    );
    catalog
}

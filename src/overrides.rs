//! Override Resolver
//!
//! Effective runtime configuration is always derived from the global
//! defaults and the project's override, field by field. Nothing is cached
//! between calls.

use crate::types::{AiProvider, AppSettings};
use serde::{Deserialize, Serialize};

/// Global engine/model defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalRuntime {
    pub engine: String,
    pub model: String,
}

impl GlobalRuntime {
    pub fn new(engine: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            model: model.into(),
        }
    }

    pub fn from_settings(settings: &AppSettings) -> Self {
        Self::new(settings.default_engine.clone(), settings.default_model.clone())
    }
}

/// Per-project override; `None` (or a blank string) inherits the global value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeOverride {
    #[serde(default)]
    pub engine: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub provider_id: Option<String>,
}

fn set(field: &Option<String>) -> Option<&str> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl RuntimeOverride {
    /// The "reset to global" override
    pub fn reset() -> Self {
        Self::default()
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        set(&self.engine).is_none() && set(&self.model).is_none() && set(&self.provider_id).is_none()
    }
}

/// Resolved engine and model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub engine: String,
    pub model: String,
}

pub fn resolve(global: &GlobalRuntime, override_: &RuntimeOverride) -> EffectiveConfig {
    EffectiveConfig {
        engine: set(&override_.engine).unwrap_or(&global.engine).to_string(),
        model: set(&override_.model).unwrap_or(&global.model).to_string(),
    }
}

/// Map a model tier to a concrete model id.
///
/// Full ids (`claude-...`) and routed ids (`vendor/model`) pass through.
pub fn resolve_model_id(model: &str) -> String {
    if model.starts_with("claude-") || model.contains('/') {
        return model.to_string();
    }
    match model {
        "opus" => "claude-opus-4-20250514".to_string(),
        "sonnet" => "claude-sonnet-4-20250514".to_string(),
        "haiku" => "claude-3-5-haiku-20241022".to_string(),
        other => other.to_string(),
    }
}

/// First four and last four characters of a key
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.is_empty() {
        return String::new();
    }
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Project,
    Global,
}

/// Full runtime preview for one project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRuntimeConfig {
    pub engine: String,
    pub model_tier: String,
    pub resolved_model: String,
    pub provider_id: Option<String>,
    pub provider_name: String,
    pub provider_type: String,
    pub api_base_url: String,
    pub api_key_preview: String,
    pub source: ConfigSource,
}

fn choose_provider<'a>(
    providers: &'a [AiProvider],
    override_: &RuntimeOverride,
    engine: &str,
) -> Option<&'a AiProvider> {
    let requested = set(&override_.provider_id)
        .and_then(|id| providers.iter().find(|p| p.enabled && p.id == id));
    requested.or_else(|| providers.iter().find(|p| p.enabled && p.engine == engine))
}

/// Resolve engine, model id and provider for a project
pub fn resolve_detailed(settings: &AppSettings, override_: &RuntimeOverride) -> ResolvedRuntimeConfig {
    let effective = resolve(&GlobalRuntime::from_settings(settings), override_);
    let provider = choose_provider(&settings.providers, override_, &effective.engine);

    let resolved_model = if effective.engine == "claude" {
        resolve_model_id(&effective.model)
    } else {
        effective.model.clone()
    };

    ResolvedRuntimeConfig {
        resolved_model,
        model_tier: effective.model,
        engine: effective.engine,
        provider_id: provider.map(|p| p.id.clone()),
        provider_name: provider.map(|p| p.name.clone()).unwrap_or_else(|| "none".to_string()),
        provider_type: provider.map(|p| p.provider_type.clone()).unwrap_or_default(),
        api_base_url: provider.map(|p| p.api_base_url.clone()).unwrap_or_default(),
        api_key_preview: provider.map(|p| mask_api_key(&p.api_key)).unwrap_or_default(),
        source: if override_.is_empty() {
            ConfigSource::Global
        } else {
            ConfigSource::Project
        },
    }
}

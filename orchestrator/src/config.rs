//! Orchestrator configuration.
//!
//! Loaded from TOML, then overridden by `ORCHESTRATOR_*` environment
//! variables. Every section has defaults, so an empty file is a valid
//! configuration. Invalid values are rejected at startup.
//!
//! ```toml
//! max_context_tokens = 100000
//! default_model = "claude-sonnet-4"
//!
//! [compaction]
//! summarize_threshold = 70.0
//! keep_recent_messages = 20
//!
//! [routing]
//! stay_threshold = 0.7
//!
//! [[hints]]
//! pattern = "(?i)invoice"
//! kind = "regex"
//! context_type = "task"
//! priority = 10
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analysis::ComplexityWeights;
use crate::error::ConfigError;
use crate::memory::CompactionSettings;
use crate::recommend::RecommendationConfig;
use crate::registry::{ModelCandidate, ModelRegistry};
use crate::routing::{HintSet, RoutingHintConfig, RoutingWeights};
use crate::selection::SelectionWeights;

pub const ENV_MAX_CONTEXT_TOKENS: &str = "ORCHESTRATOR_MAX_CONTEXT_TOKENS";
pub const ENV_SUMMARIZE_THRESHOLD: &str = "ORCHESTRATOR_SUMMARIZE_THRESHOLD";
pub const ENV_KEEP_RECENT_MESSAGES: &str = "ORCHESTRATOR_KEEP_RECENT_MESSAGES";
pub const ENV_AUTO_ARCHIVE_DAYS: &str = "ORCHESTRATOR_AUTO_ARCHIVE_DAYS";
pub const ENV_DEFAULT_MODEL: &str = "ORCHESTRATOR_DEFAULT_MODEL";
pub const ENV_SUMMARIZE_TIMEOUT_SECS: &str = "ORCHESTRATOR_SUMMARIZE_TIMEOUT_SECS";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Token budget of a single context.
    pub max_context_tokens: u64,
    /// Designated fallback model.
    pub default_model: Option<String>,
    /// Model catalogue. Empty means the built-in catalogue.
    pub models: Vec<ModelCandidate>,
    /// Active messages included verbatim in a generation prompt.
    pub prompt_recent_messages: usize,
    /// Active contexts idle this long are paused by maintenance. `None` disables.
    pub auto_pause_idle_hours: Option<i64>,
    pub compaction: CompactionSettings,
    pub routing: RoutingWeights,
    pub selection: SelectionWeights,
    pub complexity: ComplexityWeights,
    pub recommendation: RecommendationConfig,
    pub hints: Vec<RoutingHintConfig>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 100_000,
            default_model: None,
            models: Vec::new(),
            prompt_recent_messages: 20,
            auto_pause_idle_hours: None,
            compaction: CompactionSettings::default(),
            routing: RoutingWeights::default(),
            selection: SelectionWeights::default(),
            complexity: ComplexityWeights::default(),
            recommendation: RecommendationConfig::default(),
            hints: Vec::new(),
        }
    }
}

impl OrchestratorConfig {
    /// Parse and validate a TOML body.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, apply environment overrides, and validate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let body = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Self = toml::from_str(&body)?;
        config.apply_env_overrides()?;
        config.validate()?;
        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `ORCHESTRATOR_*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_MAX_CONTEXT_TOKENS) {
            self.max_context_tokens = parse_env(ENV_MAX_CONTEXT_TOKENS, &v)?;
        }
        if let Some(v) = lookup(ENV_SUMMARIZE_THRESHOLD) {
            self.compaction.summarize_threshold = parse_env(ENV_SUMMARIZE_THRESHOLD, &v)?;
        }
        if let Some(v) = lookup(ENV_KEEP_RECENT_MESSAGES) {
            self.compaction.keep_recent_messages = parse_env(ENV_KEEP_RECENT_MESSAGES, &v)?;
        }
        if let Some(v) = lookup(ENV_AUTO_ARCHIVE_DAYS) {
            self.recommendation.auto_archive_after_days = parse_env(ENV_AUTO_ARCHIVE_DAYS, &v)?;
        }
        if let Some(v) = lookup(ENV_SUMMARIZE_TIMEOUT_SECS) {
            self.compaction.summarize_timeout_secs = match v.trim() {
                "" | "none" | "0" => None,
                other => Some(parse_env(ENV_SUMMARIZE_TIMEOUT_SECS, other)?),
            };
        }
        if let Some(v) = lookup(ENV_DEFAULT_MODEL) {
            let v = v.trim();
            self.default_model = (!v.is_empty()).then(|| v.to_string());
        }
        Ok(())
    }

    /// Reject values that would make the orchestrator misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_context_tokens == 0 {
            return Err(ConfigError::invalid("max_context_tokens", "must be positive"));
        }
        if self.prompt_recent_messages == 0 {
            return Err(ConfigError::invalid("prompt_recent_messages", "must be at least 1"));
        }
        if matches!(self.auto_pause_idle_hours, Some(h) if h <= 0) {
            return Err(ConfigError::invalid("auto_pause_idle_hours", "must be positive"));
        }
        self.compaction
            .validate()
            .map_err(|e| ConfigError::invalid("compaction", e))?;
        self.routing
            .validate()
            .map_err(|e| ConfigError::invalid("routing", e))?;
        self.selection
            .validate()
            .map_err(|e| ConfigError::invalid("selection", e))?;
        self.recommendation
            .validate()
            .map_err(|e| ConfigError::invalid("recommendation", e))?;
        validate_complexity(&self.complexity)?;
        HintSet::from_configs(&self.hints)?;
        self.build_registry()?;
        Ok(())
    }

    /// Model registry described by this config.
    pub fn build_registry(&self) -> Result<ModelRegistry, ConfigError> {
        if self.models.is_empty() {
            let mut registry = ModelRegistry::with_defaults();
            if let Some(default) = &self.default_model {
                registry.set_default(default)?;
            }
            Ok(registry)
        } else {
            ModelRegistry::from_models(self.models.clone(), self.default_model.clone())
        }
    }

    /// Compiled routing hints.
    pub fn build_hints(&self) -> Result<HintSet, ConfigError> {
        HintSet::from_configs(&self.hints)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(key, format!("cannot parse {value:?}")))
}

fn validate_complexity(weights: &ComplexityWeights) -> Result<(), ConfigError> {
    let scalars = [
        weights.code,
        weights.technical_term,
        weights.technical_term_cap,
        weights.abstract_concept,
        weights.abstract_concept_cap,
        weights.multi_step_reasoning,
        weights.creativity,
        weights.data_analysis,
        weights.ambiguity,
    ];
    if scalars.iter().any(|w| *w < 0.0) {
        return Err(ConfigError::invalid("complexity", "weights must not be negative"));
    }
    let t = weights.level_thresholds;
    if t.iter().any(|v| !(0.0..=1.0).contains(v)) || t.windows(2).any(|w| w[0] >= w[1]) {
        return Err(ConfigError::invalid(
            "complexity.level_thresholds",
            "must be strictly increasing within 0.0-1.0",
        ));
    }
    Ok(())
}

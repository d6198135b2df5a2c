//! Model Registry: candidate models and their capability, cost, latency, and quality
//!
//! Holds the static catalogue the selector scores against. Entries are kept
//! in a `BTreeMap` so iteration order (and therefore tie-breaking) is stable.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;

/// Capability a model advertises
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Code,
    Reasoning,
    Creative,
    Vision,
    Tools,
    LongContext,
    Fast,
    Cheap,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code => write!(f, "code"),
            Self::Reasoning => write!(f, "reasoning"),
            Self::Creative => write!(f, "creative"),
            Self::Vision => write!(f, "vision"),
            Self::Tools => write!(f, "tools"),
            Self::LongContext => write!(f, "long_context"),
            Self::Fast => write!(f, "fast"),
            Self::Cheap => write!(f, "cheap"),
        }
    }
}

/// Deliberate-reasoning effort, ordered from none to most
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingLevel {
    #[default]
    Off,
    Low,
    Medium,
    High,
}

impl std::fmt::Display for ThinkingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Price per 1k tokens
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CostPer1k {
    pub input: f64,
    pub output: f64,
}

/// Latency profile in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatencyProfile {
    pub first_token: u64,
    pub per_token: f64,
}

/// Static descriptor of a candidate model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCandidate {
    pub model_id: String,
    pub capabilities: BTreeSet<Capability>,
    /// Context window in tokens
    pub context_window: u64,
    pub cost_per_1k_tokens: CostPer1k,
    pub latency_ms: LatencyProfile,
    /// 0–100
    pub quality_score: f64,
    #[serde(default)]
    pub thinking_support: bool,
    #[serde(default)]
    pub max_thinking_level: ThinkingLevel,
}

impl ModelCandidate {
    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Estimated cost of a call with the given token counts.
    pub fn estimate_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        input_tokens as f64 / 1000.0 * self.cost_per_1k_tokens.input
            + output_tokens as f64 / 1000.0 * self.cost_per_1k_tokens.output
    }

    /// Estimated latency to produce `output_tokens`.
    pub fn estimate_latency_ms(&self, output_tokens: u64) -> u64 {
        self.latency_ms.first_token + (self.latency_ms.per_token * output_tokens as f64).round() as u64
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.model_id.trim().is_empty() {
            return Err(ConfigError::invalid("models.model_id", "must not be empty"));
        }
        if self.context_window == 0 {
            return Err(ConfigError::invalid(
                "models.context_window",
                format!("{} has a zero context window", self.model_id),
            ));
        }
        if !(0.0..=100.0).contains(&self.quality_score) {
            return Err(ConfigError::invalid(
                "models.quality_score",
                format!("{} quality {} outside 0-100", self.model_id, self.quality_score),
            ));
        }
        if self.cost_per_1k_tokens.input < 0.0 || self.cost_per_1k_tokens.output < 0.0 {
            return Err(ConfigError::invalid(
                "models.cost_per_1k_tokens",
                format!("{} has a negative price", self.model_id),
            ));
        }
        Ok(())
    }
}

/// Concrete generation settings for one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_id: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub thinking_level: ThinkingLevel,
}

/// On-disk registry layout (`[[models]]` tables plus an optional default)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryFile {
    #[serde(default)]
    pub default_model: Option<String>,
    pub models: Vec<ModelCandidate>,
}

/// Registry of candidate models
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelCandidate>,
    default_model: Option<String>,
}

impl ModelRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in catalogue
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for model in default_catalogue() {
            registry.register(model);
        }
        registry
    }

    /// Build from a list of candidates and an optional designated default
    pub fn from_models(
        models: Vec<ModelCandidate>,
        default_model: Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for model in models {
            model.validate()?;
            registry.register(model);
        }
        if let Some(default) = default_model {
            registry.set_default(&default)?;
        }
        registry.validate()?;
        Ok(registry)
    }

    /// Parse a TOML registry file body
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let file: RegistryFile = toml::from_str(input)?;
        Self::from_models(file.models, file.default_model)
    }

    /// Load a TOML registry file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let body = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let registry = Self::from_toml_str(&body)?;
        info!(path = %path.display(), models = registry.len(), "Model registry loaded");
        Ok(registry)
    }

    /// Add or replace a model
    pub fn register(&mut self, model: ModelCandidate) {
        debug!(model_id = %model.model_id, "Model registered");
        self.models.insert(model.model_id.clone(), model);
    }

    /// Remove a model; clears the designated default if it was this one
    pub fn remove(&mut self, model_id: &str) -> Option<ModelCandidate> {
        if self.default_model.as_deref() == Some(model_id) {
            self.default_model = None;
        }
        self.models.remove(model_id)
    }

    pub fn get(&self, model_id: &str) -> Option<&ModelCandidate> {
        self.models.get(model_id)
    }

    /// All models in id order
    pub fn all(&self) -> impl Iterator<Item = &ModelCandidate> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Designate the default model
    pub fn set_default(&mut self, model_id: &str) -> Result<(), ConfigError> {
        if !self.models.contains_key(model_id) {
            return Err(ConfigError::MissingDefaultModel(model_id.to_string()));
        }
        self.default_model = Some(model_id.to_string());
        Ok(())
    }

    pub fn default_model_id(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    /// Model used when nothing passes the hard constraints.
    ///
    /// The designated default if set, else the largest context window with
    /// the lowest cost breaking ties.
    pub fn fallback_model(&self) -> Option<&ModelCandidate> {
        if let Some(model) = self.default_model.as_deref().and_then(|id| self.models.get(id)) {
            return Some(model);
        }
        self.models.values().min_by(|a, b| {
            b.context_window
                .cmp(&a.context_window)
                .then_with(|| {
                    let ca = a.cost_per_1k_tokens.input + a.cost_per_1k_tokens.output;
                    let cb = b.cost_per_1k_tokens.input + b.cost_per_1k_tokens.output;
                    ca.total_cmp(&cb)
                })
                .then_with(|| a.model_id.cmp(&b.model_id))
        })
    }

    /// Registry must be non-empty and its default must exist
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.models.is_empty() {
            return Err(ConfigError::EmptyRegistry);
        }
        if let Some(default) = &self.default_model {
            if !self.models.contains_key(default) {
                return Err(ConfigError::MissingDefaultModel(default.clone()));
            }
        }
        for model in self.models.values() {
            model.validate()?;
        }
        Ok(())
    }
}

fn caps(list: &[Capability]) -> BTreeSet<Capability> {
    list.iter().copied().collect()
}

/// Built-in catalogue of widely available models
pub fn default_catalogue() -> Vec<ModelCandidate> {
    use Capability::*;

    let model = |id: &str,
                 capabilities: &[Capability],
                 context_window: u64,
                 cost: (f64, f64),
                 latency: (u64, f64),
                 quality_score: f64,
                 thinking: ThinkingLevel| ModelCandidate {
        model_id: id.to_string(),
        capabilities: caps(capabilities),
        context_window,
        cost_per_1k_tokens: CostPer1k {
            input: cost.0,
            output: cost.1,
        },
        latency_ms: LatencyProfile {
            first_token: latency.0,
            per_token: latency.1,
        },
        quality_score,
        thinking_support: thinking > ThinkingLevel::Off,
        max_thinking_level: thinking,
    };

    vec![
        model(
            "claude-opus-4",
            &[Code, Reasoning, Creative, Vision, Tools, LongContext],
            200_000,
            (0.015, 0.075),
            (2_000, 30.0),
            95.0,
            ThinkingLevel::High,
        ),
        model(
            "claude-sonnet-4",
            &[Code, Reasoning, Creative, Vision, Tools, LongContext],
            200_000,
            (0.003, 0.015),
            (1_000, 15.0),
            88.0,
            ThinkingLevel::High,
        ),
        model(
            "claude-haiku-3-5",
            &[Code, Tools, Fast, Cheap],
            200_000,
            (0.0008, 0.004),
            (400, 8.0),
            72.0,
            ThinkingLevel::Off,
        ),
        model(
            "gpt-4o",
            &[Code, Creative, Vision, Tools, Fast],
            128_000,
            (0.0025, 0.01),
            (600, 10.0),
            85.0,
            ThinkingLevel::Off,
        ),
        model(
            "gpt-4o-mini",
            &[Tools, Vision, Fast, Cheap],
            128_000,
            (0.00015, 0.0006),
            (300, 6.0),
            68.0,
            ThinkingLevel::Off,
        ),
        model(
            "o3-mini",
            &[Code, Reasoning, Tools],
            200_000,
            (0.0011, 0.0044),
            (1_500, 12.0),
            86.0,
            ThinkingLevel::High,
        ),
        model(
            "gemini-1.5-pro",
            &[Code, Reasoning, Vision, LongContext],
            2_000_000,
            (0.00125, 0.005),
            (900, 12.0),
            84.0,
            ThinkingLevel::Off,
        ),
        model(
            "gemini-1.5-flash",
            &[Vision, LongContext, Fast, Cheap],
            1_000_000,
            (0.000075, 0.0003),
            (300, 5.0),
            70.0,
            ThinkingLevel::Off,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_defaults() {
        let registry = ModelRegistry::with_defaults();
        assert_eq!(registry.len(), 8);
        assert!(registry.get("claude-sonnet-4").is_some());
        assert!(registry.validate().is_ok());
    }

    #[test]
    fn test_fallback_prefers_largest_window() {
        let registry = ModelRegistry::with_defaults();
        assert_eq!(registry.fallback_model().unwrap().model_id, "gemini-1.5-pro");
    }

    #[test]
    fn test_fallback_uses_designated_default() {
        let mut registry = ModelRegistry::with_defaults();
        registry.set_default("gpt-4o-mini").unwrap();
        assert_eq!(registry.fallback_model().unwrap().model_id, "gpt-4o-mini");

        registry.remove("gpt-4o-mini");
        assert!(registry.default_model_id().is_none());
        assert_eq!(registry.fallback_model().unwrap().model_id, "gemini-1.5-pro");
    }

    #[test]
    fn test_set_default_requires_registration() {
        let mut registry = ModelRegistry::new();
        assert!(matches!(
            registry.set_default("ghost"),
            Err(ConfigError::MissingDefaultModel(_))
        ));
    }

    #[test]
    fn test_empty_registry_is_invalid() {
        assert!(matches!(
            ModelRegistry::new().validate(),
            Err(ConfigError::EmptyRegistry)
        ));
        assert!(ModelRegistry::new().fallback_model().is_none());
    }

    #[test]
    fn test_from_toml_str() {
        let toml = r#"
default_model = "local-small"

[[models]]
model_id = "local-small"
capabilities = ["code", "fast", "cheap"]
context_window = 32000
quality_score = 60.0
cost_per_1k_tokens = { input = 0.0, output = 0.0 }
latency_ms = { first_token = 100, per_token = 20.0 }

[[models]]
model_id = "local-large"
capabilities = ["code", "reasoning"]
context_window = 64000
quality_score = 80.0
thinking_support = true
max_thinking_level = "medium"
cost_per_1k_tokens = { input = 0.0, output = 0.0 }
latency_ms = { first_token = 400, per_token = 60.0 }
"#;
        let registry = ModelRegistry::from_toml_str(toml).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.default_model_id(), Some("local-small"));
        let large = registry.get("local-large").unwrap();
        assert!(large.has(Capability::Reasoning));
        assert_eq!(large.max_thinking_level, ThinkingLevel::Medium);
    }

    #[test]
    fn test_from_toml_missing_default() {
        let toml = r#"
default_model = "absent"

[[models]]
model_id = "only"
capabilities = []
context_window = 1000
quality_score = 50.0
cost_per_1k_tokens = { input = 0.0, output = 0.0 }
latency_ms = { first_token = 1, per_token = 1.0 }
"#;
        assert!(matches!(
            ModelRegistry::from_toml_str(toml),
            Err(ConfigError::MissingDefaultModel(_))
        ));
    }

    #[test]
    fn test_cost_and_latency_estimates() {
        let registry = ModelRegistry::with_defaults();
        let sonnet = registry.get("claude-sonnet-4").unwrap();
        let cost = sonnet.estimate_cost(2_000, 1_000);
        assert!((cost - (0.006 + 0.015)).abs() < 1e-12);
        assert_eq!(sonnet.estimate_latency_ms(100), 1_000 + 1_500);
    }

    #[test]
    fn test_thinking_levels_ordered() {
        assert!(ThinkingLevel::Off < ThinkingLevel::Low);
        assert!(ThinkingLevel::Medium < ThinkingLevel::High);
    }
}

//! Caller-supplied routing hints: a pattern that pins matching messages to
//! a context type.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::context::ContextType;
use crate::error::ConfigError;

/// How a hint pattern is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintMatchKind {
    Regex,
    /// Case-insensitive substring.
    #[default]
    Substring,
}

/// Serialized hint as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingHintConfig {
    pub pattern: String,
    #[serde(default)]
    pub kind: HintMatchKind,
    pub context_type: ContextType,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone)]
enum HintMatcher {
    Regex(Regex),
    Substring(String),
}

/// A compiled routing hint.
#[derive(Debug, Clone)]
pub struct RoutingHint {
    pattern: String,
    matcher: HintMatcher,
    pub context_type: ContextType,
    pub priority: i32,
}

impl RoutingHint {
    pub fn regex(pattern: &str, context_type: ContextType, priority: i32) -> Result<Self, ConfigError> {
        Self::from_config(&RoutingHintConfig {
            pattern: pattern.to_string(),
            kind: HintMatchKind::Regex,
            context_type,
            priority,
        })
    }

    pub fn substring(pattern: &str, context_type: ContextType, priority: i32) -> Result<Self, ConfigError> {
        Self::from_config(&RoutingHintConfig {
            pattern: pattern.to_string(),
            kind: HintMatchKind::Substring,
            context_type,
            priority,
        })
    }

    pub fn from_config(config: &RoutingHintConfig) -> Result<Self, ConfigError> {
        if config.pattern.trim().is_empty() {
            return Err(ConfigError::invalid("hints.pattern", "must not be empty"));
        }
        let matcher = match config.kind {
            HintMatchKind::Regex => HintMatcher::Regex(Regex::new(&config.pattern).map_err(|e| {
                ConfigError::invalid("hints.pattern", format!("{}: {e}", config.pattern))
            })?),
            HintMatchKind::Substring => HintMatcher::Substring(config.pattern.to_lowercase()),
        };
        Ok(Self {
            pattern: config.pattern.clone(),
            matcher,
            context_type: config.context_type,
            priority: config.priority,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, text: &str) -> bool {
        match &self.matcher {
            HintMatcher::Regex(re) => re.is_match(text),
            HintMatcher::Substring(needle) => text.to_lowercase().contains(needle.as_str()),
        }
    }
}

/// Hints ordered by descending priority; insertion order breaks ties.
#[derive(Debug, Clone, Default)]
pub struct HintSet {
    hints: Vec<RoutingHint>,
}

impl HintSet {
    pub fn new(hints: Vec<RoutingHint>) -> Self {
        let mut set = Self::default();
        for hint in hints {
            set.push(hint);
        }
        set
    }

    pub fn from_configs(configs: &[RoutingHintConfig]) -> Result<Self, ConfigError> {
        let hints = configs
            .iter()
            .map(RoutingHint::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(hints))
    }

    pub fn push(&mut self, hint: RoutingHint) {
        let at = self
            .hints
            .iter()
            .position(|h| h.priority < hint.priority)
            .unwrap_or(self.hints.len());
        self.hints.insert(at, hint);
    }

    /// Highest-priority hint matching the text.
    pub fn first_match(&self, text: &str) -> Option<&RoutingHint> {
        self.hints.iter().find(|h| h.matches(text))
    }

    pub fn len(&self) -> usize {
        self.hints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }
}

//! Token budgeting: pluggable estimators and the utilization-based compaction trigger.
//!
//! A context is compacted when its utilization of the configured maximum
//! crosses the summarize threshold and it holds enough messages that
//! something remains to compact after the most recent ones are kept.

use serde::{Deserialize, Serialize};

/// Approximate token weight of a piece of text.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> u32;

    /// Short identifier used in logs.
    fn name(&self) -> &str;
}

/// `ceil(words * tokens_per_word)`; roughly 1.3 for English prose.
#[derive(Debug, Clone)]
pub struct WordCountEstimator {
    pub tokens_per_word: f64,
}

impl Default for WordCountEstimator {
    fn default() -> Self {
        Self {
            tokens_per_word: 1.3,
        }
    }
}

impl TokenEstimator for WordCountEstimator {
    fn estimate(&self, text: &str) -> u32 {
        let words = text.split_whitespace().count() as f64;
        (words * self.tokens_per_word).ceil() as u32
    }

    fn name(&self) -> &str {
        "words"
    }
}

/// `ceil(chars / chars_per_token)`; roughly 4 characters per token.
#[derive(Debug, Clone)]
pub struct CharCountEstimator {
    pub chars_per_token: f64,
}

impl Default for CharCountEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: 4.0,
        }
    }
}

impl TokenEstimator for CharCountEstimator {
    fn estimate(&self, text: &str) -> u32 {
        let chars = text.chars().count() as f64;
        (chars / self.chars_per_token.max(1.0)).ceil() as u32
    }

    fn name(&self) -> &str {
        "chars"
    }
}

/// Compaction thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionSettings {
    /// Utilization percentage (0–100) at which compaction triggers.
    pub summarize_threshold: f64,
    /// Minimum messages a compaction must cover.
    pub min_messages_to_summarize: usize,
    /// Most recent messages that are never compacted.
    pub keep_recent_messages: usize,
    /// Max tokens for generated summaries.
    pub max_summary_tokens: u32,
    /// Deadline for the summarization call, in seconds. `None` waits indefinitely.
    pub summarize_timeout_secs: Option<u64>,
}

impl Default for CompactionSettings {
    fn default() -> Self {
        Self {
            summarize_threshold: 70.0,
            min_messages_to_summarize: 10,
            keep_recent_messages: 20,
            max_summary_tokens: 2_000,
            summarize_timeout_secs: Some(60),
        }
    }
}

impl CompactionSettings {
    /// Validate settings.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=100.0).contains(&self.summarize_threshold) {
            return Err(format!(
                "summarize_threshold ({}) must be within 0-100",
                self.summarize_threshold
            ));
        }
        if self.keep_recent_messages == 0 {
            return Err("keep_recent_messages must be at least 1".to_string());
        }
        if self.min_messages_to_summarize == 0 {
            return Err("min_messages_to_summarize must be at least 1".to_string());
        }
        if self.max_summary_tokens == 0 {
            return Err("max_summary_tokens must be at least 1".to_string());
        }
        Ok(())
    }

    /// Messages needed before compaction can trigger.
    pub fn min_active_messages(&self) -> usize {
        self.min_messages_to_summarize + self.keep_recent_messages
    }
}

/// Decision from the compaction trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BudgetDecision {
    /// Below the utilization threshold.
    WithinBudget { utilization: f64 },
    /// Over threshold but too few messages to compact.
    InsufficientMessages {
        utilization: f64,
        active_messages: usize,
        required: usize,
    },
    /// Compaction should run over the `eligible` oldest messages.
    CompactionRequired { utilization: f64, eligible: usize },
}

impl BudgetDecision {
    /// Whether compaction should run.
    pub fn should_compact(&self) -> bool {
        matches!(self, Self::CompactionRequired { .. })
    }
}

impl std::fmt::Display for BudgetDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WithinBudget { utilization } => {
                write!(f, "within_budget ({:.1}%)", utilization)
            }
            Self::InsufficientMessages {
                utilization,
                active_messages,
                required,
            } => write!(
                f,
                "insufficient_messages ({:.1}%, {} of {} messages)",
                utilization, active_messages, required
            ),
            Self::CompactionRequired {
                utilization,
                eligible,
            } => write!(
                f,
                "compaction_required ({:.1}%, {} eligible)",
                utilization, eligible
            ),
        }
    }
}

/// Utilization percentage of `total_tokens` against `max_tokens`, clamped to 0–100.
pub fn utilization(total_tokens: u64, max_tokens: u64) -> f64 {
    if max_tokens == 0 {
        return 100.0;
    }
    (total_tokens as f64 * 100.0 / max_tokens as f64).clamp(0.0, 100.0)
}

/// Evaluates whether compaction should trigger for a context.
#[derive(Debug, Clone, Default)]
pub struct CompactionTrigger {
    settings: CompactionSettings,
}

impl CompactionTrigger {
    pub fn new(settings: CompactionSettings) -> Self {
        Self { settings }
    }

    /// Evaluate utilization and message count.
    pub fn evaluate(&self, utilization: f64, active_messages: usize) -> BudgetDecision {
        if utilization < self.settings.summarize_threshold {
            return BudgetDecision::WithinBudget { utilization };
        }

        let required = self.settings.min_active_messages();
        if active_messages < required {
            return BudgetDecision::InsufficientMessages {
                utilization,
                active_messages,
                required,
            };
        }

        BudgetDecision::CompactionRequired {
            utilization,
            eligible: self.entries_to_compact(active_messages),
        }
    }

    /// Oldest messages eligible for compaction: all but the most recent.
    pub fn entries_to_compact(&self, active_messages: usize) -> usize {
        active_messages.saturating_sub(self.settings.keep_recent_messages)
    }

    pub fn settings(&self) -> &CompactionSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimators_round_up() {
        let words = WordCountEstimator::default();
        let chars = CharCountEstimator::default();
        // 5 words * 1.3 = 6.5; 25 chars / 4 = 6.25
        let text = "move the kanban cards now";
        assert_eq!(words.estimate(text), 7);
        assert_eq!(chars.estimate(text), 7);
        assert_eq!(words.estimate(""), 0);
        assert_eq!(chars.estimate(""), 0);
    }

    #[test]
    fn test_settings_defaults_and_validate() {
        let mut settings = CompactionSettings::default();
        assert_eq!(settings.min_active_messages(), 30);
        assert!(settings.validate().is_ok());

        settings.summarize_threshold = 120.0;
        assert!(settings.validate().is_err());

        settings.summarize_threshold = 70.0;
        settings.keep_recent_messages = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_utilization_clamped() {
        assert_eq!(utilization(75_000, 100_000), 75.0);
        assert_eq!(utilization(250_000, 100_000), 100.0);
        assert_eq!(utilization(10, 0), 100.0);
    }

    #[test]
    fn test_trigger_within_budget() {
        let trigger = CompactionTrigger::default();
        let decision = trigger.evaluate(50.0, 100);
        assert!(matches!(decision, BudgetDecision::WithinBudget { .. }));
        assert!(!decision.should_compact());
    }

    #[test]
    fn test_trigger_needs_enough_messages() {
        let trigger = CompactionTrigger::default();
        let decision = trigger.evaluate(90.0, 29);
        assert_eq!(
            decision,
            BudgetDecision::InsufficientMessages {
                utilization: 90.0,
                active_messages: 29,
                required: 30
            }
        );
        assert!(!decision.should_compact());
    }

    #[test]
    fn test_trigger_required_keeps_recent() {
        let trigger = CompactionTrigger::default();
        let decision = trigger.evaluate(75.0, 35);
        assert_eq!(
            decision,
            BudgetDecision::CompactionRequired {
                utilization: 75.0,
                eligible: 15
            }
        );
    }

    #[test]
    fn test_trigger_boundary_exact_threshold() {
        let trigger = CompactionTrigger::default();
        assert!(trigger.evaluate(70.0, 30).should_compact());
    }

    #[test]
    fn test_decision_display() {
        let d = BudgetDecision::CompactionRequired {
            utilization: 75.0,
            eligible: 15,
        };
        assert_eq!(d.to_string(), "compaction_required (75.0%, 15 eligible)");
    }

    #[test]
    fn test_settings_serde() {
        let settings: CompactionSettings =
            serde_json::from_str(r#"{"keep_recent_messages": 5}"#).unwrap();
        assert_eq!(settings.keep_recent_messages, 5);
        assert_eq!(settings.summarize_threshold, 70.0);
    }
}

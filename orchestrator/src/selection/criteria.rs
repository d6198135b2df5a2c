//! Selection criteria, caller preferences, and scoring weights.

use serde::{Deserialize, Serialize};

use crate::analysis::ComplexityLevel;

/// How soon a reply is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Immediate,
    #[default]
    Normal,
    Background,
}

/// How much answer quality matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityRequirement {
    Low,
    Medium,
    High,
    Critical,
}

impl QualityRequirement {
    /// Default requirement for a complexity level.
    pub fn for_complexity(level: ComplexityLevel) -> Self {
        match level {
            ComplexityLevel::Trivial | ComplexityLevel::Simple => Self::Low,
            ComplexityLevel::Moderate => Self::Medium,
            ComplexityLevel::Complex => Self::High,
            ComplexityLevel::Expert => Self::Critical,
        }
    }
}

/// Caller-supplied overrides for model selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionPreferences {
    pub urgency: Urgency,
    /// Maximum spend for one call, in the registry's currency.
    pub budget: Option<f64>,
    /// Overrides the complexity-derived requirement.
    pub quality_requirement: Option<QualityRequirement>,
    /// Force vision even when no cue words are present.
    pub requires_vision: bool,
}

/// Everything a candidate is scored against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionCriteria {
    pub task_complexity: ComplexityLevel,
    pub requires_reasoning: bool,
    pub requires_code: bool,
    pub requires_creativity: bool,
    pub requires_vision: bool,
    /// Estimated prompt tokens (message plus context).
    pub context_length: u64,
    pub urgency: Urgency,
    pub budget_constraint: Option<f64>,
    pub quality_requirement: QualityRequirement,
}

/// Tunable selection weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionWeights {
    /// Base-quality multiplier per requirement: low, medium, high, critical.
    pub quality_by_requirement: [f64; 4],
    pub code_match: f64,
    pub reasoning_match: f64,
    pub creativity_match: f64,
    /// Ceiling of the complexity-fit term.
    pub complexity_fit_max: f64,
    /// Quality threshold per level: trivial, simple, moderate, complex, expert.
    pub complexity_quality_thresholds: [f64; 5],
    /// Fit lost per quality point above threshold.
    pub overkill_penalty: f64,
    /// Fit lost per quality point below threshold.
    pub shortfall_penalty: f64,
    pub urgent_fast_bonus: f64,
    pub urgent_slow_penalty: f64,
    pub background_cheap_bonus: f64,
    pub over_budget_penalty: f64,
    pub under_budget_bonus: f64,
    /// Cost below this fraction of the budget counts as well under.
    pub under_budget_ratio: f64,
    pub thinking_bonus: f64,
    /// Multiplier on `success_rate − 0.5`.
    pub history_weight: f64,
    /// Outcomes needed before history counts.
    pub history_min_samples: usize,
    /// Outcomes kept per model.
    pub history_window: usize,
}

impl Default for SelectionWeights {
    fn default() -> Self {
        Self {
            quality_by_requirement: [0.2, 0.4, 0.6, 0.8],
            code_match: 0.15,
            reasoning_match: 0.2,
            creativity_match: 0.15,
            complexity_fit_max: 0.2,
            complexity_quality_thresholds: [60.0, 70.0, 80.0, 88.0, 95.0],
            overkill_penalty: 0.005,
            shortfall_penalty: 0.02,
            urgent_fast_bonus: 0.2,
            urgent_slow_penalty: 0.1,
            background_cheap_bonus: 0.1,
            over_budget_penalty: 0.3,
            under_budget_bonus: 0.1,
            under_budget_ratio: 0.5,
            thinking_bonus: 0.15,
            history_weight: 0.2,
            history_min_samples: 10,
            history_window: 100,
        }
    }
}

impl SelectionWeights {
    pub fn quality_weight(&self, requirement: QualityRequirement) -> f64 {
        match requirement {
            QualityRequirement::Low => self.quality_by_requirement[0],
            QualityRequirement::Medium => self.quality_by_requirement[1],
            QualityRequirement::High => self.quality_by_requirement[2],
            QualityRequirement::Critical => self.quality_by_requirement[3],
        }
    }

    pub fn quality_threshold(&self, level: ComplexityLevel) -> f64 {
        match level {
            ComplexityLevel::Trivial => self.complexity_quality_thresholds[0],
            ComplexityLevel::Simple => self.complexity_quality_thresholds[1],
            ComplexityLevel::Moderate => self.complexity_quality_thresholds[2],
            ComplexityLevel::Complex => self.complexity_quality_thresholds[3],
            ComplexityLevel::Expert => self.complexity_quality_thresholds[4],
        }
    }

    /// Fit of a candidate's quality to the level's threshold, 0 to `complexity_fit_max`.
    pub fn complexity_fit(&self, quality: f64, level: ComplexityLevel) -> f64 {
        let threshold = self.quality_threshold(level);
        let fit = if quality >= threshold {
            self.complexity_fit_max - (quality - threshold) * self.overkill_penalty
        } else {
            self.complexity_fit_max - (threshold - quality) * self.shortfall_penalty
        };
        fit.clamp(0.0, self.complexity_fit_max)
    }

    pub fn validate(&self) -> Result<(), String> {
        let scalars = [
            ("code_match", self.code_match),
            ("reasoning_match", self.reasoning_match),
            ("creativity_match", self.creativity_match),
            ("complexity_fit_max", self.complexity_fit_max),
            ("overkill_penalty", self.overkill_penalty),
            ("shortfall_penalty", self.shortfall_penalty),
            ("urgent_fast_bonus", self.urgent_fast_bonus),
            ("urgent_slow_penalty", self.urgent_slow_penalty),
            ("background_cheap_bonus", self.background_cheap_bonus),
            ("over_budget_penalty", self.over_budget_penalty),
            ("under_budget_bonus", self.under_budget_bonus),
            ("thinking_bonus", self.thinking_bonus),
            ("history_weight", self.history_weight),
        ];
        if let Some((name, _)) = scalars.iter().find(|(_, v)| *v < 0.0) {
            return Err(format!("{name} must not be negative"));
        }
        if self.quality_by_requirement.iter().any(|w| *w < 0.0) {
            return Err("quality_by_requirement must not be negative".to_string());
        }
        if self.history_window == 0 {
            return Err("history_window must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Max output tokens per complexity tier.
pub fn max_output_tokens(level: ComplexityLevel) -> u32 {
    match level {
        ComplexityLevel::Trivial | ComplexityLevel::Simple => 1024,
        ComplexityLevel::Moderate => 4096,
        ComplexityLevel::Complex | ComplexityLevel::Expert => 8192,
    }
}

//! Model selector: scores registry candidates against selection criteria.
//!
//! Scoring is pure: the same message, context, preferences, registry, and
//! usage history always yield the same recommendation. Recording usage is
//! the only mutation and happens through [`ModelSelector::record_usage`].

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::criteria::{
    max_output_tokens, QualityRequirement, SelectionCriteria, SelectionPreferences,
    SelectionWeights, Urgency,
};
use super::history::{UsageHistory, UsageStats};
use crate::analysis::{ComplexityAnalysis, ComplexityAnalyzer, ComplexityLevel};
use crate::context::Context;
use crate::memory::{TokenEstimator, WordCountEstimator};
use crate::registry::{Capability, ModelCandidate, ModelConfig, ModelRegistry, ThinkingLevel};
use crate::text::words;

const VISION_CUES: &[&str] = &[
    "image", "images", "screenshot", "screenshots", "picture", "pictures", "photo", "photos",
    "diagram", "attached", "attachment",
];

/// Alternatives reported alongside the winner.
const ALTERNATIVE_COUNT: usize = 3;

/// One scored candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredModel {
    pub model_id: String,
    /// 0.0–1.0
    pub score: f64,
}

/// Selector output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecommendation {
    pub model: ModelCandidate,
    pub config: ModelConfig,
    /// 0.0–1.0
    pub score: f64,
    pub reasoning: Vec<String>,
    pub estimated_cost: f64,
    pub estimated_latency_ms: u64,
    pub complexity: ComplexityAnalysis,
    pub criteria: SelectionCriteria,
    pub alternatives: Vec<ScoredModel>,
    /// True when no candidate passed the hard constraints.
    pub fallback: bool,
}

/// Scores candidates from a registry.
pub struct ModelSelector {
    registry: ModelRegistry,
    analyzer: ComplexityAnalyzer,
    weights: SelectionWeights,
    history: UsageHistory,
    estimator: Box<dyn TokenEstimator>,
}

impl ModelSelector {
    pub fn new(registry: ModelRegistry) -> Self {
        Self::with_weights(registry, ComplexityAnalyzer::new(), SelectionWeights::default())
    }

    pub fn with_weights(
        registry: ModelRegistry,
        analyzer: ComplexityAnalyzer,
        weights: SelectionWeights,
    ) -> Self {
        Self {
            history: UsageHistory::new(weights.history_window),
            registry,
            analyzer,
            weights,
            estimator: Box::new(WordCountEstimator::default()),
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ModelRegistry {
        &mut self.registry
    }

    pub fn weights(&self) -> &SelectionWeights {
        &self.weights
    }

    /// Record the outcome of a call for future scoring.
    pub fn record_usage(&mut self, model_id: &str, success: bool) {
        self.history.record(model_id, success);
        debug!(model_id, success, "Model usage recorded");
    }

    pub fn usage_stats(&self, model_id: &str) -> Option<UsageStats> {
        self.history.stats(model_id)
    }

    /// Derive selection criteria for a message.
    pub fn build_criteria(
        &self,
        message: &str,
        analysis: &ComplexityAnalysis,
        context: Option<&Context>,
        preferences: &SelectionPreferences,
    ) -> SelectionCriteria {
        let message_tokens = u64::from(self.estimator.estimate(message));
        let context_tokens = context.map_or(0, |c| c.token_usage.total);
        let requires_vision = preferences.requires_vision
            || words(message)
                .iter()
                .any(|w| VISION_CUES.contains(&w.as_str()));

        SelectionCriteria {
            task_complexity: analysis.level,
            requires_reasoning: analysis.signals.multi_step_reasoning,
            requires_code: analysis.signals.code_presence,
            requires_creativity: analysis.signals.creativity_required,
            requires_vision,
            context_length: message_tokens + context_tokens,
            urgency: preferences.urgency,
            budget_constraint: preferences.budget,
            quality_requirement: preferences
                .quality_requirement
                .unwrap_or_else(|| QualityRequirement::for_complexity(analysis.level)),
        }
    }

    /// Recommend a model and generation config for a message.
    ///
    /// Never fails while the registry is non-empty: when every candidate is
    /// rejected, the registry's fallback model is returned.
    pub fn select(
        &self,
        message: &str,
        context: Option<&Context>,
        preferences: &SelectionPreferences,
    ) -> Option<ModelRecommendation> {
        let history: Vec<&str> = context
            .map(|c| c.recent_messages(5).iter().map(|m| m.content.as_str()).collect())
            .unwrap_or_default();
        let analysis = self.analyzer.analyze(message, &history);
        let criteria = self.build_criteria(message, &analysis, context, preferences);
        self.select_with_criteria(analysis, criteria)
    }

    /// Score the registry against pre-built criteria.
    pub fn select_with_criteria(
        &self,
        analysis: ComplexityAnalysis,
        criteria: SelectionCriteria,
    ) -> Option<ModelRecommendation> {
        let output_tokens = u64::from(max_output_tokens(criteria.task_complexity));

        let mut scored: Vec<(f64, &ModelCandidate, Vec<String>)> = self
            .registry
            .all()
            .filter(|m| self.passes_hard_constraints(m, &criteria))
            .map(|m| {
                let (score, reasons) = self.score_candidate(m, &criteria, output_tokens);
                (score, m, reasons)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.model_id.cmp(&b.1.model_id))
        });

        let (score, model, mut reasoning, fallback) = match scored.first() {
            Some((score, model, reasons)) => ((*score).clamp(0.0, 1.0), *model, reasons.clone(), false),
            None => {
                let model = self.registry.fallback_model()?;
                warn!(
                    model_id = %model.model_id,
                    vision = criteria.requires_vision,
                    context_length = criteria.context_length,
                    "No candidate passed hard constraints, using fallback model"
                );
                (
                    0.0,
                    model,
                    vec![format!(
                        "fallback: no candidate satisfied the hard constraints, using {}",
                        model.model_id
                    )],
                    true,
                )
            }
        };

        reasoning.insert(
            0,
            format!(
                "complexity {} (score {:.2})",
                analysis.level, analysis.score
            ),
        );

        let alternatives = scored
            .iter()
            .skip(1)
            .take(ALTERNATIVE_COUNT)
            .map(|(s, m, _)| ScoredModel {
                model_id: m.model_id.clone(),
                score: s.clamp(0.0, 1.0),
            })
            .collect();

        let config = build_config(model, &criteria);
        let recommendation = ModelRecommendation {
            estimated_cost: model.estimate_cost(criteria.context_length, output_tokens),
            estimated_latency_ms: model.estimate_latency_ms(output_tokens),
            model: model.clone(),
            config,
            score,
            reasoning,
            complexity: analysis,
            criteria,
            alternatives,
            fallback,
        };

        debug!(
            model_id = %recommendation.model.model_id,
            score = recommendation.score,
            complexity = %recommendation.complexity.level,
            fallback,
            "Model selected"
        );
        Some(recommendation)
    }

    fn passes_hard_constraints(&self, model: &ModelCandidate, criteria: &SelectionCriteria) -> bool {
        if criteria.requires_vision && !model.has(Capability::Vision) {
            return false;
        }
        criteria.context_length <= model.context_window
    }

    fn score_candidate(
        &self,
        model: &ModelCandidate,
        criteria: &SelectionCriteria,
        output_tokens: u64,
    ) -> (f64, Vec<String>) {
        let w = &self.weights;
        let mut reasons = Vec::new();

        let mut score =
            model.quality_score / 100.0 * w.quality_weight(criteria.quality_requirement);
        reasons.push(format!("quality {:.0}", model.quality_score));

        if criteria.requires_code && model.has(Capability::Code) {
            score += w.code_match;
            reasons.push("code capable".to_string());
        }
        if criteria.requires_reasoning && model.has(Capability::Reasoning) {
            score += w.reasoning_match;
            reasons.push("reasoning capable".to_string());
        }
        if criteria.requires_creativity && model.has(Capability::Creative) {
            score += w.creativity_match;
            reasons.push("creative capable".to_string());
        }

        score += w.complexity_fit(model.quality_score, criteria.task_complexity);

        match criteria.urgency {
            Urgency::Immediate if model.has(Capability::Fast) => {
                score += w.urgent_fast_bonus;
                reasons.push("fast for immediate reply".to_string());
            }
            Urgency::Immediate => score -= w.urgent_slow_penalty,
            Urgency::Background if model.has(Capability::Cheap) => {
                score += w.background_cheap_bonus;
                reasons.push("cheap for background work".to_string());
            }
            Urgency::Background | Urgency::Normal => {}
        }

        if let Some(budget) = criteria.budget_constraint {
            let cost = model.estimate_cost(criteria.context_length, output_tokens);
            if cost > budget {
                score -= w.over_budget_penalty;
                reasons.push(format!("over budget ({cost:.4} > {budget:.4})"));
            } else if cost < budget * w.under_budget_ratio {
                score += w.under_budget_bonus;
                reasons.push("well under budget".to_string());
            }
        }

        if criteria.task_complexity.is_demanding() && model.thinking_support {
            score += w.thinking_bonus;
            reasons.push("supports thinking".to_string());
        }

        if let Some(rate) = self
            .history
            .success_rate(&model.model_id, w.history_min_samples)
        {
            score += (rate - 0.5) * w.history_weight;
            reasons.push(format!("historical success {:.0}%", rate * 100.0));
        }

        (score, reasons)
    }
}

/// Thinking level for a complexity tier, capped by the model.
pub fn thinking_level_for(level: ComplexityLevel, model: &ModelCandidate) -> ThinkingLevel {
    if !model.thinking_support {
        return ThinkingLevel::Off;
    }
    let wanted = match level {
        ComplexityLevel::Trivial | ComplexityLevel::Simple => ThinkingLevel::Off,
        ComplexityLevel::Moderate => ThinkingLevel::Low,
        ComplexityLevel::Complex => ThinkingLevel::Medium,
        ComplexityLevel::Expert => ThinkingLevel::High,
    };
    wanted.min(model.max_thinking_level)
}

/// Temperature from the requirement mix.
pub fn temperature_for(criteria: &SelectionCriteria) -> f64 {
    if criteria.requires_creativity {
        0.9
    } else if criteria.requires_code {
        0.3
    } else if criteria.requires_reasoning {
        0.5
    } else {
        0.7
    }
}

fn build_config(model: &ModelCandidate, criteria: &SelectionCriteria) -> ModelConfig {
    ModelConfig {
        model_id: model.model_id.clone(),
        temperature: temperature_for(criteria),
        max_output_tokens: max_output_tokens(criteria.task_complexity),
        thinking_level: thinking_level_for(criteria.task_complexity, model),
    }
}

//! Multi-factor message-to-context similarity.
//!
//! Five factors, each normalised to 0.0–1.0 and weighted:
//! goal keyword coverage, topic overlap, entity overlap, similarity to the
//! most recent messages, and recency of activity.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::clock::SharedClock;
use crate::context::Context;
use crate::text::{extract_entities, jaccard, keyword_set, shared_count};

/// Tunable routing weights and thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingWeights {
    pub goal: f64,
    pub topics: f64,
    pub entities: f64,
    pub recent_messages: f64,
    pub recency: f64,
    /// Goal coverage at which the goal factor saturates.
    pub goal_saturation: f64,
    /// Shared topics at which the topic factor saturates.
    pub topic_saturation: f64,
    /// Shared entities at which the entity factor saturates.
    pub entity_saturation: f64,
    /// Messages compared for the recent-similarity factor.
    pub recent_window: usize,
    /// Hours over which recency decays to zero.
    pub recency_horizon_hours: f64,
    /// Minimum score for the current context to keep a message.
    pub stay_threshold: f64,
    /// Maximum gap to the top score for the current context to keep a message.
    pub stay_margin: f64,
    /// Below this top score a new context is suggested.
    pub new_context_threshold: f64,
    pub explicit_switch_confidence: f64,
    pub hint_confidence: f64,
}

impl Default for RoutingWeights {
    fn default() -> Self {
        Self {
            goal: 0.3,
            topics: 0.25,
            entities: 0.25,
            recent_messages: 0.15,
            recency: 0.05,
            goal_saturation: 0.4,
            topic_saturation: 3.0,
            entity_saturation: 2.0,
            recent_window: 5,
            recency_horizon_hours: 24.0,
            stay_threshold: 0.7,
            stay_margin: 0.2,
            new_context_threshold: 0.5,
            explicit_switch_confidence: 0.95,
            hint_confidence: 0.85,
        }
    }
}

impl RoutingWeights {
    pub fn validate(&self) -> Result<(), String> {
        let weights = [
            ("goal", self.goal),
            ("topics", self.topics),
            ("entities", self.entities),
            ("recent_messages", self.recent_messages),
            ("recency", self.recency),
        ];
        if let Some((name, _)) = weights.iter().find(|(_, w)| *w < 0.0) {
            return Err(format!("{name} weight must not be negative"));
        }
        let saturations = [
            ("goal_saturation", self.goal_saturation),
            ("topic_saturation", self.topic_saturation),
            ("entity_saturation", self.entity_saturation),
            ("recency_horizon_hours", self.recency_horizon_hours),
        ];
        if let Some((name, _)) = saturations.iter().find(|(_, v)| *v <= 0.0) {
            return Err(format!("{name} must be positive"));
        }
        let unit = [
            ("stay_threshold", self.stay_threshold),
            ("stay_margin", self.stay_margin),
            ("new_context_threshold", self.new_context_threshold),
            ("explicit_switch_confidence", self.explicit_switch_confidence),
            ("hint_confidence", self.hint_confidence),
        ];
        if let Some((name, _)) = unit.iter().find(|(_, v)| !(0.0..=1.0).contains(v)) {
            return Err(format!("{name} must be within 0.0-1.0"));
        }
        Ok(())
    }
}

/// Keyword and entity features of one message, computed once per route.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageFeatures {
    pub keywords: BTreeSet<String>,
    pub entities: BTreeSet<String>,
}

impl MessageFeatures {
    pub fn from_text(text: &str) -> Self {
        Self {
            keywords: keyword_set(text),
            entities: extract_entities(text)
                .into_iter()
                .map(|e| e.normalized)
                .collect(),
        }
    }
}

/// Per-factor breakdown of a score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreFactors {
    pub goal: f64,
    pub topics: f64,
    pub entities: f64,
    pub recent_messages: f64,
    pub recency: f64,
}

/// Similarity of a message to one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextScore {
    pub context_id: String,
    /// Weighted total, clamped to 0.0–1.0.
    pub score: f64,
    pub factors: ScoreFactors,
}

/// Scores messages against contexts.
#[derive(Clone)]
pub struct ContextScorer {
    weights: RoutingWeights,
    clock: SharedClock,
}

impl ContextScorer {
    pub fn new(weights: RoutingWeights, clock: SharedClock) -> Self {
        Self { weights, clock }
    }

    pub fn weights(&self) -> &RoutingWeights {
        &self.weights
    }

    /// Score one context.
    pub fn score(&self, features: &MessageFeatures, context: &Context) -> ContextScore {
        let w = &self.weights;
        let factors = ScoreFactors {
            goal: self.goal_factor(features, context),
            topics: saturate(
                shared_count(&features.keywords, &context.summary.topics) as f64,
                w.topic_saturation,
            ),
            entities: saturate(self.entity_hits(features, context) as f64, w.entity_saturation),
            recent_messages: self.recent_factor(features, context),
            recency: self.recency_factor(context),
        };

        let score = factors.goal * w.goal
            + factors.topics * w.topics
            + factors.entities * w.entities
            + factors.recent_messages * w.recent_messages
            + factors.recency * w.recency;

        ContextScore {
            context_id: context.id.clone(),
            score: score.clamp(0.0, 1.0),
            factors,
        }
    }

    /// Score and rank contexts, best first. Ties go to the most recently
    /// active context, then the lower id.
    pub fn rank<'a, I>(&self, features: &MessageFeatures, contexts: I) -> Vec<ContextScore>
    where
        I: IntoIterator<Item = &'a Context>,
    {
        let mut ranked: Vec<(ContextScore, &Context)> = contexts
            .into_iter()
            .map(|c| (self.score(features, c), c))
            .collect();
        ranked.sort_by(|(a, ca), (b, cb)| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| cb.last_active_at.cmp(&ca.last_active_at))
                .then_with(|| a.context_id.cmp(&b.context_id))
        });
        ranked.into_iter().map(|(s, _)| s).collect()
    }

    fn goal_factor(&self, features: &MessageFeatures, context: &Context) -> f64 {
        let Some(goal) = context.goal.as_deref() else {
            return 0.0;
        };
        let goal_keywords = keyword_set(goal);
        if goal_keywords.is_empty() {
            return 0.0;
        }
        let coverage =
            shared_count(&goal_keywords, &features.keywords) as f64 / goal_keywords.len() as f64;
        saturate(coverage, self.weights.goal_saturation)
    }

    fn entity_hits(&self, features: &MessageFeatures, context: &Context) -> usize {
        context
            .summary
            .entities
            .iter()
            .filter(|e| {
                features.entities.contains(&e.normalized)
                    || features.keywords.contains(&e.normalized)
            })
            .count()
    }

    fn recent_factor(&self, features: &MessageFeatures, context: &Context) -> f64 {
        context
            .recent_messages(self.weights.recent_window)
            .iter()
            .map(|m| jaccard(&features.keywords, &keyword_set(&m.content)))
            .fold(0.0, f64::max)
    }

    fn recency_factor(&self, context: &Context) -> f64 {
        let elapsed = self.clock.now() - context.last_active_at;
        let hours = elapsed.num_seconds().max(0) as f64 / 3600.0;
        (1.0 - hours / self.weights.recency_horizon_hours).clamp(0.0, 1.0)
    }
}

fn saturate(value: f64, at: f64) -> f64 {
    (value / at).min(1.0)
}

//! Context router: decides which context an inbound message belongs to.
//!
//! Precedence:
//!
//! 1. An explicit switch phrase naming an open context.
//! 2. The highest-priority routing hint that matches.
//! 3. Multi-factor scoring, with a stability bias toward the current context.
//!
//! When nothing scores well enough the decision suggests a new context and
//! a type guessed from content cues. Routing never fails.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::hints::HintSet;
use super::scoring::{ContextScore, ContextScorer, MessageFeatures, RoutingWeights};
use crate::analysis::complexity::count_terms;
use crate::analysis::{IntentClassifier, IntentType};
use crate::clock::SharedClock;
use crate::context::{Context, ContextStatus, ContextType};
use crate::text::keyword_set;

/// Alternatives reported alongside the target.
const ALTERNATIVE_COUNT: usize = 3;
/// Share of the switch target's keywords a context must cover to match.
const SWITCH_KEYWORD_COVERAGE: f64 = 0.5;

static SWITCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:switch(?:ing)?\s+(?:back\s+)?to|go(?:ing)?\s+back\s+to|get\s+back\s+to|back\s+to|return(?:ing)?\s+to|continue\s+(?:with|on)|resume)\s+(?:the\s+|my\s+|our\s+)?(.+)$",
    )
    .expect("switch regex should compile")
});

const TASK_CUES: &[&str] = &[
    "todo", "task", "deadline", "remind", "reminder", "checklist", "ticket", "implement",
    "build", "fix", "deliverable", "milestone",
];
const SPECIALIST_CUES: &[&str] = &[
    "expert", "specialist", "legal", "medical", "tax", "compliance", "security audit",
    "deep dive", "consult", "diagnose",
];
const BACKGROUND_CUES: &[&str] = &[
    "background", "monitor", "watch", "periodically", "whenever", "schedule", "later",
    "keep an eye", "every day", "nightly",
];
const EXTERNAL_CUES: &[&str] = &[
    "email", "slack", "github", "jira", "webhook", "calendar", "import", "inbox",
    "notification", "third-party",
];

/// Caller preferences for one routing call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingPreferences {
    /// Apply the stability bias toward the current context.
    pub prefer_current: bool,
    /// Allow a new-context suggestion; when false the best open context wins.
    pub allow_new_context: bool,
}

impl Default for RoutingPreferences {
    fn default() -> Self {
        Self {
            prefer_current: true,
            allow_new_context: true,
        }
    }
}

/// Runner-up context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingAlternative {
    pub context_id: String,
    pub confidence: f64,
}

/// Which rule produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingRule {
    ExplicitSwitch,
    Hint,
    StayOnCurrent,
    BestScore,
    NewContext,
}

/// Router output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// `None` when a new context is suggested.
    pub target_context_id: Option<String>,
    /// 0.0–1.0
    pub confidence: f64,
    /// One line per rule step, in evaluation order.
    pub reasoning: Vec<String>,
    pub alternatives: Vec<RoutingAlternative>,
    pub suggest_new_context: bool,
    pub suggested_context_type: Option<ContextType>,
    pub rule: RoutingRule,
    pub intent: IntentType,
}

impl RoutingDecision {
    fn to_context(
        context_id: &str,
        confidence: f64,
        reasoning: Vec<String>,
        rule: RoutingRule,
        intent: IntentType,
    ) -> Self {
        Self {
            target_context_id: Some(context_id.to_string()),
            confidence: confidence.clamp(0.0, 1.0),
            reasoning,
            alternatives: Vec::new(),
            suggest_new_context: false,
            suggested_context_type: None,
            rule,
            intent,
        }
    }

    fn new_context(
        context_type: ContextType,
        confidence: f64,
        reasoning: Vec<String>,
        intent: IntentType,
    ) -> Self {
        Self {
            target_context_id: None,
            confidence: confidence.clamp(0.0, 1.0),
            reasoning,
            alternatives: Vec::new(),
            suggest_new_context: true,
            suggested_context_type: Some(context_type),
            rule: RoutingRule::NewContext,
            intent,
        }
    }

    fn with_alternatives(mut self, alternatives: Vec<RoutingAlternative>) -> Self {
        self.alternatives = alternatives;
        self
    }
}

/// Routes messages to contexts.
pub struct ContextRouter {
    scorer: ContextScorer,
    classifier: IntentClassifier,
    hints: HintSet,
}

impl ContextRouter {
    pub fn new(weights: RoutingWeights, clock: SharedClock) -> Self {
        Self::with_hints(weights, clock, HintSet::default())
    }

    pub fn with_hints(weights: RoutingWeights, clock: SharedClock, hints: HintSet) -> Self {
        Self {
            scorer: ContextScorer::new(weights, clock),
            classifier: IntentClassifier::new(),
            hints,
        }
    }

    pub fn scorer(&self) -> &ContextScorer {
        &self.scorer
    }

    pub fn hints(&self) -> &HintSet {
        &self.hints
    }

    pub fn hints_mut(&mut self) -> &mut HintSet {
        &mut self.hints
    }

    /// Route a message. Archived and failed contexts are never targeted.
    pub fn route(
        &self,
        message: &str,
        contexts: &[Context],
        current_context_id: Option<&str>,
        preferences: &RoutingPreferences,
    ) -> RoutingDecision {
        let intent = self.classifier.primary(message).intent_type;
        let open: Vec<&Context> = contexts.iter().filter(|c| c.status.is_open()).collect();
        let weights = self.scorer.weights();
        let mut reasoning = vec![format!("intent {intent}, {} open context(s)", open.len())];

        if let Some((context, target)) = self.explicit_switch(message, &open) {
            reasoning.push(format!("explicit switch to \"{target}\""));
            let decision = RoutingDecision::to_context(
                &context.id,
                weights.explicit_switch_confidence,
                reasoning,
                RoutingRule::ExplicitSwitch,
                IntentType::ContextSwitch,
            );
            return log_decision(decision);
        }

        if let Some(hint) = self.hints.first_match(message) {
            reasoning.push(format!("routing hint \"{}\" → {}", hint.pattern(), hint.context_type));
            let hinted = open
                .iter()
                .filter(|c| c.status == ContextStatus::Active && c.context_type == hint.context_type)
                .max_by(|a, b| {
                    a.last_active_at
                        .cmp(&b.last_active_at)
                        .then_with(|| b.id.cmp(&a.id))
                });
            let decision = match hinted {
                Some(context) => {
                    reasoning.push(format!("most recent active {} context", hint.context_type));
                    RoutingDecision::to_context(
                        &context.id,
                        weights.hint_confidence,
                        reasoning,
                        RoutingRule::Hint,
                        intent,
                    )
                }
                None => {
                    reasoning.push(format!("no active {} context exists", hint.context_type));
                    RoutingDecision::new_context(
                        hint.context_type,
                        weights.hint_confidence,
                        reasoning,
                        intent,
                    )
                }
            };
            return log_decision(decision);
        }

        let features = MessageFeatures::from_text(message);
        let ranked = self.scorer.rank(&features, open.iter().copied());
        log_decision(self.decide_by_score(
            message,
            intent,
            &ranked,
            current_context_id,
            preferences,
            reasoning,
        ))
    }

    fn decide_by_score(
        &self,
        message: &str,
        intent: IntentType,
        ranked: &[ContextScore],
        current_context_id: Option<&str>,
        preferences: &RoutingPreferences,
        mut reasoning: Vec<String>,
    ) -> RoutingDecision {
        let weights = self.scorer.weights();

        let Some(top) = ranked.first() else {
            let context_type = suggest_context_type(message, intent);
            reasoning.push(format!("no open contexts, new {context_type} context"));
            return RoutingDecision::new_context(context_type, 1.0, reasoning, intent);
        };
        reasoning.push(format!(
            "best match {} (goal {:.2}, topics {:.2}, entities {:.2}, recent {:.2}, recency {:.2})",
            top.context_id,
            top.factors.goal,
            top.factors.topics,
            top.factors.entities,
            top.factors.recent_messages,
            top.factors.recency
        ));

        if preferences.prefer_current {
            if let Some(current) =
                current_context_id.and_then(|id| ranked.iter().find(|s| s.context_id == id))
            {
                if current.score >= weights.stay_threshold
                    && top.score - current.score <= weights.stay_margin
                {
                    reasoning.push(format!(
                        "staying on current context (score {:.2}, top {:.2})",
                        current.score, top.score
                    ));
                    return RoutingDecision::to_context(
                        &current.context_id,
                        current.score,
                        reasoning,
                        RoutingRule::StayOnCurrent,
                        intent,
                    )
                    .with_alternatives(alternatives(ranked, &current.context_id));
                }
            }
        }

        if top.score < weights.new_context_threshold && preferences.allow_new_context {
            let context_type = suggest_context_type(message, intent);
            reasoning.push(format!(
                "score {:.2} below {:.2}, new {context_type} context",
                top.score, weights.new_context_threshold
            ));
            return RoutingDecision::new_context(context_type, 1.0 - top.score, reasoning, intent)
            .with_alternatives(alternatives(ranked, ""));
        }

        reasoning.push(format!("routing to best match (score {:.2})", top.score));
        RoutingDecision::to_context(
            &top.context_id,
            top.score,
            reasoning,
            RoutingRule::BestScore,
            intent,
        )
        .with_alternatives(alternatives(ranked, &top.context_id))
    }

    /// Context named by an explicit switch phrase, with the phrase target.
    fn explicit_switch<'a>(
        &self,
        message: &str,
        open: &[&'a Context],
    ) -> Option<(&'a Context, String)> {
        let caps = SWITCH_RE.captures(message.trim())?;
        let target = caps
            .get(1)?
            .as_str()
            .trim()
            .trim_end_matches(['.', '!', '?', ','])
            .trim();
        if target.is_empty() {
            return None;
        }
        let target_lower = target.to_lowercase();
        let target_keywords = keyword_set(target);

        let mut best: Option<(&Context, f64)> = None;
        for context in open {
            let coverage = if context.id == target {
                1.0
            } else {
                switch_coverage(context, &target_lower, &target_keywords)
            };
            if coverage < SWITCH_KEYWORD_COVERAGE {
                continue;
            }
            let better = match best {
                None => true,
                Some((b, c)) => {
                    coverage > c || (coverage == c && context.last_active_at > b.last_active_at)
                }
            };
            if better {
                best = Some((context, coverage));
            }
        }
        best.map(|(c, _)| (c, target.to_string()))
    }
}

fn switch_coverage(
    context: &Context,
    target_lower: &str,
    target_keywords: &std::collections::BTreeSet<String>,
) -> f64 {
    let goal = context.goal.as_deref().unwrap_or_default().to_lowercase();
    if !goal.is_empty() && goal.contains(target_lower) {
        return 1.0;
    }
    if target_keywords.is_empty() {
        return 0.0;
    }
    let mut known = keyword_set(&goal);
    known.extend(context.summary.topics.iter().cloned());
    target_keywords.intersection(&known).count() as f64 / target_keywords.len() as f64
}

fn alternatives(ranked: &[ContextScore], exclude: &str) -> Vec<RoutingAlternative> {
    ranked
        .iter()
        .filter(|s| s.context_id != exclude)
        .take(ALTERNATIVE_COUNT)
        .map(|s| RoutingAlternative {
            context_id: s.context_id.clone(),
            confidence: s.score,
        })
        .collect()
}

/// Context type suggested by content cues; ties resolve in declaration order.
pub fn suggest_context_type(message: &str, intent: IntentType) -> ContextType {
    let lower = message.to_lowercase();
    let candidates = [
        (ContextType::Specialist, count_terms(&lower, SPECIALIST_CUES)),
        (ContextType::Task, count_terms(&lower, TASK_CUES)),
        (ContextType::Background, count_terms(&lower, BACKGROUND_CUES)),
        (ContextType::External, count_terms(&lower, EXTERNAL_CUES)),
    ];
    let best = candidates
        .iter()
        .fold(None::<(ContextType, usize)>, |acc, &(ty, hits)| match acc {
            Some((_, best_hits)) if best_hits >= hits => acc,
            _ if hits > 0 => Some((ty, hits)),
            _ => acc,
        });
    match best {
        Some((ty, _)) => ty,
        None if intent == IntentType::TaskCreation => ContextType::Task,
        None => ContextType::Primary,
    }
}

fn log_decision(decision: RoutingDecision) -> RoutingDecision {
    debug!(
        target_context = decision.target_context_id.as_deref().unwrap_or("<new>"),
        confidence = decision.confidence,
        rule = ?decision.rule,
        suggest_new = decision.suggest_new_context,
        "Routing decision"
    );
    decision
}

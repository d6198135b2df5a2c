//! Structured `tracing` spans for the per-message pipeline.
//!
//! Field names use OpenTelemetry-style dot notation so spans export cleanly
//! through any `tracing` layer. The library never installs a subscriber.
//!
//! # Span Hierarchy
//!
//! ```text
//! orchestrator.handle_message      (one per inbound message)
//!   ├─ orchestrator.route          (routing decision)
//!   ├─ orchestrator.select_model   (model selection)
//!   └─ orchestrator.generate       (generation call)
//! orchestrator.compaction          (one per compaction attempt, usually on the worker)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::Span;

use crate::memory::{CompactionError, CompactionOutcome};
use crate::routing::RoutingDecision;
use crate::selection::ModelRecommendation;

pub const SPAN_HANDLE_MESSAGE: &str = "orchestrator.handle_message";
pub const SPAN_ROUTE: &str = "orchestrator.route";
pub const SPAN_SELECT_MODEL: &str = "orchestrator.select_model";
pub const SPAN_GENERATE: &str = "orchestrator.generate";
pub const SPAN_COMPACTION: &str = "orchestrator.compaction";

pub const FIELD_CONTEXT_ID: &str = "context.id";
pub const FIELD_ROUTE_RULE: &str = "route.rule";
pub const FIELD_ROUTE_CONFIDENCE: &str = "route.confidence";
pub const FIELD_NEW_CONTEXT: &str = "route.new_context";
pub const FIELD_MODEL: &str = "model.id";
pub const FIELD_COMPLEXITY: &str = "model.complexity";
pub const FIELD_FALLBACK: &str = "model.fallback";
pub const FIELD_SUCCESS: &str = "orchestrator.success";
pub const FIELD_DURATION_MS: &str = "orchestrator.duration_ms";
pub const FIELD_TOKENS: &str = "orchestrator.tokens";
pub const FIELD_COMPACTION_OUTCOME: &str = "compaction.outcome";
pub const FIELD_COMPACTED: &str = "compaction.messages";
pub const FIELD_UTILIZATION: &str = "compaction.utilization_after";

/// Root span for one inbound message.
///
/// Fields filled later via [`record_message_result`]: context id, success, duration.
pub fn message_span(current_context: Option<&str>, message_chars: usize) -> Span {
    tracing::info_span!(
        "orchestrator.handle_message",
        "context.current" = current_context.unwrap_or("none"),
        "message.chars" = message_chars as u64,
        "context.id" = tracing::field::Empty,
        "orchestrator.success" = tracing::field::Empty,
        "orchestrator.duration_ms" = tracing::field::Empty,
    )
}

pub fn record_message_result(span: &Span, context_id: &str, success: bool, duration_ms: u64) {
    span.record(FIELD_CONTEXT_ID, context_id);
    span.record(FIELD_SUCCESS, success);
    span.record(FIELD_DURATION_MS, duration_ms);
}

/// Span for a routing decision over `open_contexts` candidates.
pub fn route_span(open_contexts: usize) -> Span {
    tracing::debug_span!(
        "orchestrator.route",
        "route.candidates" = open_contexts as u64,
        "route.rule" = tracing::field::Empty,
        "route.confidence" = tracing::field::Empty,
        "route.new_context" = tracing::field::Empty,
        "context.id" = tracing::field::Empty,
    )
}

pub fn record_route(span: &Span, decision: &RoutingDecision) {
    span.record(FIELD_ROUTE_RULE, tracing::field::debug(decision.rule));
    span.record(FIELD_ROUTE_CONFIDENCE, decision.confidence);
    span.record(FIELD_NEW_CONTEXT, decision.suggest_new_context);
    if let Some(id) = decision.target_context_id.as_deref() {
        span.record(FIELD_CONTEXT_ID, id);
    }
}

/// Span for model selection within a context.
pub fn selection_span(context_id: &str) -> Span {
    tracing::debug_span!(
        "orchestrator.select_model",
        "context.id" = %context_id,
        "model.id" = tracing::field::Empty,
        "model.complexity" = tracing::field::Empty,
        "model.fallback" = tracing::field::Empty,
    )
}

pub fn record_selection(span: &Span, recommendation: &ModelRecommendation) {
    span.record(FIELD_MODEL, recommendation.model.model_id.as_str());
    span.record(
        FIELD_COMPLEXITY,
        tracing::field::display(recommendation.complexity.level),
    );
    span.record(FIELD_FALLBACK, recommendation.fallback);
}

/// Span for one generation call.
pub fn generation_span(model: &str, context_id: &str) -> Span {
    tracing::info_span!(
        "orchestrator.generate",
        "model.id" = %model,
        "context.id" = %context_id,
        "orchestrator.success" = tracing::field::Empty,
        "orchestrator.duration_ms" = tracing::field::Empty,
        "orchestrator.tokens" = tracing::field::Empty,
    )
}

pub fn record_generation_result(span: &Span, success: bool, duration_ms: u64, reply_tokens: u32) {
    span.record(FIELD_SUCCESS, success);
    span.record(FIELD_DURATION_MS, duration_ms);
    span.record(FIELD_TOKENS, reply_tokens);
}

/// Span for one compaction attempt.
pub fn compaction_span(context_id: &str, keep_recent: usize) -> Span {
    tracing::info_span!(
        "orchestrator.compaction",
        "context.id" = %context_id,
        "compaction.keep_recent" = keep_recent as u64,
        "compaction.outcome" = tracing::field::Empty,
        "compaction.messages" = tracing::field::Empty,
        "compaction.utilization_after" = tracing::field::Empty,
    )
}

pub fn record_compaction_result(span: &Span, result: &Result<CompactionOutcome, CompactionError>) {
    match result {
        Ok(CompactionOutcome::Compacted { snapshot, state }) => {
            span.record(FIELD_COMPACTION_OUTCOME, "compacted");
            span.record(FIELD_COMPACTED, snapshot.message_count() as u64);
            span.record(FIELD_UTILIZATION, state.context_utilization);
        }
        Ok(CompactionOutcome::Skipped { .. }) => {
            span.record(FIELD_COMPACTION_OUTCOME, "skipped");
        }
        Err(err) => {
            span.record(FIELD_COMPACTION_OUTCOME, tracing::field::display(err.kind));
        }
    }
}

/// Running counters for a facade instance.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    messages: AtomicU64,
    new_contexts: AtomicU64,
    explicit_switches: AtomicU64,
    hint_routes: AtomicU64,
    fallback_selections: AtomicU64,
    generation_failures: AtomicU64,
    generated_tokens: AtomicU64,
}

/// Point-in-time copy of [`PipelineCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub messages: u64,
    pub new_contexts: u64,
    pub explicit_switches: u64,
    pub hint_routes: u64,
    pub fallback_selections: u64,
    pub generation_failures: u64,
    pub generated_tokens: u64,
}

impl PipelineSummary {
    /// Share of messages that opened a new context (0.0 to 1.0).
    pub fn new_context_rate(&self) -> f64 {
        if self.messages == 0 {
            return 0.0;
        }
        self.new_contexts as f64 / self.messages as f64
    }
}

impl PipelineCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_route(&self, decision: &RoutingDecision) {
        use crate::routing::RoutingRule;

        self.messages.fetch_add(1, Ordering::Relaxed);
        if decision.suggest_new_context {
            self.new_contexts.fetch_add(1, Ordering::Relaxed);
        }
        match decision.rule {
            RoutingRule::ExplicitSwitch => {
                self.explicit_switches.fetch_add(1, Ordering::Relaxed);
            }
            RoutingRule::Hint => {
                self.hint_routes.fetch_add(1, Ordering::Relaxed);
            }
            RoutingRule::StayOnCurrent | RoutingRule::BestScore | RoutingRule::NewContext => {}
        }
    }

    pub fn record_selection(&self, recommendation: &ModelRecommendation) {
        if recommendation.fallback {
            self.fallback_selections.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_generation(&self, success: bool, tokens: u32) {
        if success {
            self.generated_tokens
                .fetch_add(u64::from(tokens), Ordering::Relaxed);
        } else {
            self.generation_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn summary(&self) -> PipelineSummary {
        PipelineSummary {
            messages: self.messages.load(Ordering::Relaxed),
            new_contexts: self.new_contexts.load(Ordering::Relaxed),
            explicit_switches: self.explicit_switches.load(Ordering::Relaxed),
            hint_routes: self.hint_routes.load(Ordering::Relaxed),
            fallback_selections: self.fallback_selections.load(Ordering::Relaxed),
            generation_failures: self.generation_failures.load(Ordering::Relaxed),
            generated_tokens: self.generated_tokens.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::IntentType;
    use crate::context::ContextType;
    use crate::routing::RoutingRule;

    fn decision(rule: RoutingRule, new_context: bool) -> RoutingDecision {
        RoutingDecision {
            target_context_id: (!new_context).then(|| "ctx-1".to_string()),
            confidence: 0.9,
            reasoning: Vec::new(),
            alternatives: vec![],
            suggest_new_context: new_context,
            suggested_context_type: new_context.then_some(ContextType::Primary),
            rule,
            intent: IntentType::Question,
        }
    }

    #[test]
    fn test_spans_accept_recorded_fields() {
        let span = route_span(3);
        record_route(&span, &decision(RoutingRule::BestScore, false));

        let span = message_span(Some("ctx-1"), 42);
        record_message_result(&span, "ctx-1", true, 12);

        let span = generation_span("mock", "ctx-1");
        record_generation_result(&span, true, 5, 20);
    }

    #[test]
    fn test_pipeline_counters() {
        let counters = PipelineCounters::new();
        counters.record_route(&decision(RoutingRule::NewContext, true));
        counters.record_route(&decision(RoutingRule::ExplicitSwitch, false));
        counters.record_route(&decision(RoutingRule::Hint, false));
        counters.record_route(&decision(RoutingRule::StayOnCurrent, false));
        counters.record_generation(true, 30);
        counters.record_generation(false, 0);

        let summary = counters.summary();
        assert_eq!(summary.messages, 4);
        assert_eq!(summary.new_contexts, 1);
        assert_eq!(summary.explicit_switches, 1);
        assert_eq!(summary.hint_routes, 1);
        assert_eq!(summary.generated_tokens, 30);
        assert_eq!(summary.generation_failures, 1);
        assert_eq!(summary.new_context_rate(), 0.25);
    }

    #[test]
    fn test_empty_summary_rate() {
        assert_eq!(PipelineSummary::default().new_context_rate(), 0.0);
    }
}

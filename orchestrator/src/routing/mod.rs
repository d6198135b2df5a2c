//! Context routing: which thread an inbound message belongs to.
//!
//! # Modules
//!
//! - [`scoring`]: Weighted goal/topic/entity/recent/recency similarity
//! - [`hints`]: Caller-supplied regex or substring hints pinned to a context type
//! - [`router`]: Explicit switches, hints, scoring, and the stability bias

pub mod hints;
pub mod router;
pub mod scoring;

pub use hints::{HintMatchKind, HintSet, RoutingHint, RoutingHintConfig};
pub use router::{
    suggest_context_type, ContextRouter, RoutingAlternative, RoutingDecision, RoutingPreferences,
    RoutingRule,
};
pub use scoring::{ContextScore, ContextScorer, MessageFeatures, RoutingWeights, ScoreFactors};

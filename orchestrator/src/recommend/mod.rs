//! Thread recommendations: which context to continue, resume, archive or merge.
//!
//! # Modules
//!
//! - [`engine`]: `ThreadRecommender`: message-driven, proactive, and merge suggestions
//! - [`actions`]: `ActionType` and the user-action history behind affinity learning
//! - [`cache`]: Bounded TTL cache driven by the injected clock

pub mod actions;
pub mod cache;
pub mod engine;

pub use actions::{ActionType, UserAction, UserActionKind, UserActionLog};
pub use cache::TtlCache;
pub use engine::{
    MergeCandidate, ProactivePreferences, RecommendationConfig, ThreadRecommendation,
    ThreadRecommender,
};

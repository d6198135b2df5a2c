//! Model selection: complexity-aware scoring of registry candidates.
//!
//! Hard constraints (vision, context window) filter the registry; survivors
//! are ranked by a weighted soft score. Usage outcomes feed back into later
//! rankings once enough samples exist.

pub mod criteria;
pub mod history;
pub mod selector;

pub use criteria::{
    max_output_tokens, QualityRequirement, SelectionCriteria, SelectionPreferences,
    SelectionWeights, Urgency,
};
pub use history::{UsageHistory, UsageStats};
pub use selector::{
    temperature_for, thinking_level_for, ModelRecommendation, ModelSelector, ScoredModel,
};

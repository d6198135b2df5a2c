//! Message analysis: complexity signals and intent classification.
//!
//! Both analyzers are pure: no I/O, no shared state, safe to run in parallel
//! across unrelated messages.
//!
//! # Modules
//!
//! - [`complexity`]: Signal vector, weighted score, and `ComplexityLevel`
//! - [`intent`]: Ranked `IntentType` classification

pub mod complexity;
pub mod intent;

pub use complexity::{
    ComplexityAnalysis, ComplexityAnalyzer, ComplexityLevel, ComplexitySignals, ComplexityWeights,
};
pub use intent::{ClassifiedIntent, IntentClassifier, IntentType};

//! Context Orchestrator Library
//!
//! Manages many concurrent conversation threads against a pool of language
//! models:
//! - Routes each inbound message to the best existing context, or opens a new one
//! - Picks the most suitable model per message from complexity and preferences
//! - Compacts old history into summary snapshots so threads grow without bound
//! - Recommends which threads to continue, resume, archive, or merge
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use context_orchestrator::{
//!     system_clock, InMemoryPersistence, MessagePreferences, MockGenerationService,
//!     Orchestrator, OrchestratorConfig,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Orchestrator::new(
//!     OrchestratorConfig::from_env()?,
//!     Arc::new(MockGenerationService::new()),
//!     Arc::new(InMemoryPersistence::new()),
//!     system_clock(),
//! )?;
//! let outcome = orchestrator
//!     .handle_message("plan the kanban board", None, &MessagePreferences::default())
//!     .await?;
//! println!("{} -> {:?}", outcome.context_id, outcome.reply);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod memory;
pub mod orchestrator;
pub mod recommend;
pub mod registry;
pub mod routing;
pub mod selection;
pub mod telemetry;
pub mod text;

// Facade
pub use config::OrchestratorConfig;
pub use orchestrator::{MaintenanceReport, MessageOutcome, MessagePreferences, Orchestrator};

// Collaborators and time
pub use clock::{system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use collaborators::{
    GenerationService, InMemoryPersistence, MockGenerationService, PersistenceStore,
    StaticTaskSource, TaskSource,
};

// Errors
pub use error::{
    ConfigError, GenerationError, OrchestratorError, OrchestratorResult, PersistenceError,
    StoreError, StoreResult, TaskSourceError,
};

// Data model
pub use context::{
    Context, ContextMessage, ContextStatus, ContextStore, ContextSummary, ContextType,
    MessageRole, TaskRefs,
};
pub use events::{EventBus, EventFilter, OrchestratorEvent, SharedEventBus};

// Analysis, routing, selection
pub use analysis::{ComplexityAnalysis, ComplexityAnalyzer, ComplexityLevel, IntentClassifier, IntentType};
pub use registry::{Capability, ModelCandidate, ModelConfig, ModelRegistry, ThinkingLevel};
pub use routing::{ContextRouter, RoutingDecision, RoutingPreferences, RoutingRule, RoutingWeights};
pub use selection::{ModelRecommendation, ModelSelector, SelectionPreferences, Urgency};

// Memory
pub use memory::{
    CompactionError, CompactionErrorKind, CompactionHandle, CompactionOutcome,
    CompactionSettings, CompactionWorker, ContextCompactor, ContextHealth, ContextState,
    ContextStatusReport, MemorySnapshot, TokenEstimator,
};

// Recommendations
pub use recommend::{
    ActionType, MergeCandidate, ProactivePreferences, RecommendationConfig,
    ThreadRecommendation, ThreadRecommender, UserActionKind,
};

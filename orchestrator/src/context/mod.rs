//! Contexts: conversation threads and the store that owns them.
//!
//! # Modules
//!
//! - [`types`]: `Context`, `ContextType`, `ContextStatus`, messages, summary, tasks
//! - [`store`]: `ContextStore` with per-context locking and the compaction claim protocol

pub mod store;
pub mod types;

pub use store::{CompactionClaim, ContextStore};
pub use types::{
    Context, ContextMessage, ContextStatus, ContextSummary, ContextType, MessageRole, TaskRefs,
    TokenUsage,
};

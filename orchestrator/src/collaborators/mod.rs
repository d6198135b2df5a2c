//! External collaborators consumed by the orchestrator.
//!
//! Each seam is an `async_trait` with `Send + Sync` bounds, held as
//! `Arc<dyn Trait>`. In-memory implementations ship alongside for tests and
//! offline use.
//!
//! # Modules
//!
//! - [`persistence`]: Contexts, snapshots, and context state
//! - [`generation`]: Reply generation and summarization
//! - [`tasks`]: Pending/active task ids per context

pub mod generation;
pub mod persistence;
pub mod tasks;

pub use generation::{GenerationService, MockGenerationService, MockMode};
pub use persistence::{InMemoryPersistence, PersistenceStore};
pub use tasks::{StaticTaskSource, TaskSource};

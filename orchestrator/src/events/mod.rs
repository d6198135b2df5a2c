//! Event notifications for orchestration activity
//!
//! Context lifecycle changes, routing decisions, model selections, and
//! background compaction outcomes are published on a Tokio broadcast bus.
//! Compaction completion and failure events are how callers learn that a
//! background compaction has finished.
//!
//! # Event Flow
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Orchestrator │────▶│  Event Bus   │────▶│  Subscribers │
//! │  Compactor   │     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventFilter, FilteredReceiver, SharedEventBus};
pub use types::OrchestratorEvent;

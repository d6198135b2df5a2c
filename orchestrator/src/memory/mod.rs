//! Infinite-context memory: token budgeting and compaction into snapshots.
//!
//! A context's oldest messages are summarized into an immutable
//! [`MemorySnapshot`] once its utilization crosses the configured threshold.
//! The most recent messages are never compacted.
//!
//! # Modules
//!
//! - [`budget`]: Token estimators and the utilization-based compaction trigger
//! - [`errors`]: Typed error taxonomy for the compaction path
//! - [`summarizer`]: Summary request/response contract and validation
//! - [`snapshot`]: `MemorySnapshot`, `ContextState`, and the status report
//! - [`compactor`]: Claim, summarize, validate, persist, commit
//! - [`worker`]: Background worker with coalesced requests

pub mod budget;
pub mod compactor;
pub mod errors;
pub mod snapshot;
pub mod summarizer;
pub mod worker;

pub use budget::{
    utilization, BudgetDecision, CharCountEstimator, CompactionSettings, CompactionTrigger,
    TokenEstimator, WordCountEstimator,
};
pub use compactor::{CompactionOutcome, ContextCompactor};
pub use errors::{CompactionError, CompactionErrorKind, TokenContext};
pub use snapshot::{ContextHealth, ContextState, ContextStatusReport, MemorySnapshot};
pub use summarizer::{build_summary_request, SummaryInputMessage, SummaryRequest, SummaryResponse};
pub use worker::{CompactionHandle, CompactionWorker, WorkerStats, WorkerStatsSnapshot};

//! Event types for orchestration notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::ComplexityLevel;
use crate::context::{ContextStatus, ContextType};
use crate::memory::CompactionErrorKind;

/// All orchestration events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    /// A new context was created
    ContextCreated {
        context_id: String,
        context_type: ContextType,
        timestamp: DateTime<Utc>,
    },

    /// A message was routed to a context
    MessageRouted {
        context_id: String,
        confidence: f64,
        new_context: bool,
        timestamp: DateTime<Utc>,
    },

    /// A context changed lifecycle status
    StatusChanged {
        context_id: String,
        from: ContextStatus,
        to: ContextStatus,
        timestamp: DateTime<Utc>,
    },

    /// Two contexts were merged
    ContextsMerged {
        source_id: String,
        target_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Compaction claimed a context
    CompactionStarted {
        context_id: String,
        message_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Compaction committed a snapshot
    CompactionCompleted {
        context_id: String,
        snapshot_id: String,
        messages_compacted: usize,
        utilization_after: f64,
        timestamp: DateTime<Utc>,
    },

    /// Compaction failed; the context is unchanged
    CompactionFailed {
        context_id: String,
        kind: CompactionErrorKind,
        detail: String,
        timestamp: DateTime<Utc>,
    },

    /// A model was chosen for a reply
    ModelSelected {
        context_id: Option<String>,
        model_id: String,
        complexity: ComplexityLevel,
        score: f64,
        fallback: bool,
        timestamp: DateTime<Utc>,
    },
}

impl OrchestratorEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            OrchestratorEvent::ContextCreated { timestamp, .. } => *timestamp,
            OrchestratorEvent::MessageRouted { timestamp, .. } => *timestamp,
            OrchestratorEvent::StatusChanged { timestamp, .. } => *timestamp,
            OrchestratorEvent::ContextsMerged { timestamp, .. } => *timestamp,
            OrchestratorEvent::CompactionStarted { timestamp, .. } => *timestamp,
            OrchestratorEvent::CompactionCompleted { timestamp, .. } => *timestamp,
            OrchestratorEvent::CompactionFailed { timestamp, .. } => *timestamp,
            OrchestratorEvent::ModelSelected { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            OrchestratorEvent::ContextCreated { .. } => "context_created",
            OrchestratorEvent::MessageRouted { .. } => "message_routed",
            OrchestratorEvent::StatusChanged { .. } => "status_changed",
            OrchestratorEvent::ContextsMerged { .. } => "contexts_merged",
            OrchestratorEvent::CompactionStarted { .. } => "compaction_started",
            OrchestratorEvent::CompactionCompleted { .. } => "compaction_completed",
            OrchestratorEvent::CompactionFailed { .. } => "compaction_failed",
            OrchestratorEvent::ModelSelected { .. } => "model_selected",
        }
    }

    /// Get the context ID if this event is context-scoped
    pub fn context_id(&self) -> Option<&str> {
        match self {
            OrchestratorEvent::ContextCreated { context_id, .. }
            | OrchestratorEvent::MessageRouted { context_id, .. }
            | OrchestratorEvent::StatusChanged { context_id, .. }
            | OrchestratorEvent::CompactionStarted { context_id, .. }
            | OrchestratorEvent::CompactionCompleted { context_id, .. }
            | OrchestratorEvent::CompactionFailed { context_id, .. } => Some(context_id),
            OrchestratorEvent::ContextsMerged { target_id, .. } => Some(target_id),
            OrchestratorEvent::ModelSelected { context_id, .. } => context_id.as_deref(),
        }
    }

    /// Whether this event ends a compaction attempt
    pub fn is_compaction_outcome(&self) -> bool {
        matches!(
            self,
            OrchestratorEvent::CompactionCompleted { .. } | OrchestratorEvent::CompactionFailed { .. }
        )
    }
}

//! Memory snapshots and per-context state rollups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::budget::utilization;
use super::errors::{CompactionError, CompactionErrorKind};
use super::summarizer::SummaryResponse;
use crate::context::{Context, ContextMessage};
use crate::text::ExtractedEntity;

/// Immutable record replacing a contiguous range of older messages.
///
/// Fields are read-only after [`MemorySnapshot::build`]; the only way to
/// obtain one is through a validated build or deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    id: String,
    thread_id: String,
    summary: String,
    key_points: Vec<String>,
    entities: Vec<ExtractedEntity>,
    message_count: usize,
    /// Tokens of the original messages.
    token_count: u64,
    /// Tokens of the summary representation.
    compressed_tokens: u64,
    first_message_id: String,
    last_message_id: String,
    first_message_at: DateTime<Utc>,
    last_message_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl MemorySnapshot {
    /// Build a snapshot over `messages`, enforcing that it shrinks them.
    pub fn build(
        thread_id: &str,
        messages: &[ContextMessage],
        response: SummaryResponse,
        compressed_tokens: u64,
        now: DateTime<Utc>,
    ) -> Result<Self, CompactionError> {
        let (first, last) = match (messages.first(), messages.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Err(CompactionError::new(
                    CompactionErrorKind::EmptyInput,
                    "snapshot needs at least one message",
                )
                .for_context(thread_id))
            }
        };

        let token_count: u64 = messages.iter().map(|m| u64::from(m.tokens)).sum();
        if compressed_tokens >= token_count {
            return Err(CompactionError::new(
                CompactionErrorKind::NoShrink,
                "summary is not smaller than the messages it replaces",
            )
            .for_context(thread_id)
            .with_messages(messages.len())
            .with_tokens(token_count, compressed_tokens));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            thread_id: thread_id.to_string(),
            summary: response.summary,
            key_points: response.key_points,
            entities: response.entities,
            message_count: messages.len(),
            token_count,
            compressed_tokens,
            first_message_id: first.id.clone(),
            last_message_id: last.id.clone(),
            first_message_at: first.timestamp,
            last_message_at: last.timestamp,
            created_at: now,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn key_points(&self) -> &[String] {
        &self.key_points
    }

    pub fn entities(&self) -> &[ExtractedEntity] {
        &self.entities
    }

    pub fn message_count(&self) -> usize {
        self.message_count
    }

    pub fn token_count(&self) -> u64 {
        self.token_count
    }

    pub fn compressed_tokens(&self) -> u64 {
        self.compressed_tokens
    }

    pub fn first_message_id(&self) -> &str {
        &self.first_message_id
    }

    pub fn last_message_id(&self) -> &str {
        &self.last_message_id
    }

    pub fn first_message_at(&self) -> DateTime<Utc> {
        self.first_message_at
    }

    pub fn last_message_at(&self) -> DateTime<Utc> {
        self.last_message_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Compression ratio (original / compressed).
    pub fn compression_ratio(&self) -> f64 {
        if self.compressed_tokens == 0 {
            return self.token_count as f64;
        }
        self.token_count as f64 / self.compressed_tokens as f64
    }

    /// Text carried into the prompt and summary recomputation.
    pub fn carried_text(&self) -> String {
        if self.key_points.is_empty() {
            self.summary.clone()
        } else {
            format!("{}\n- {}", self.summary, self.key_points.join("\n- "))
        }
    }
}

/// Per-thread rollup of token usage and compaction history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextState {
    pub thread_id: String,
    pub total_tokens: u64,
    pub active_message_count: usize,
    pub snapshot_count: usize,
    pub last_snapshot_at: Option<DateTime<Utc>>,
    /// 0–100
    pub context_utilization: f64,
}

impl ContextState {
    /// Compute the rollup for a context given its snapshot history.
    pub fn compute(context: &Context, snapshots: &[MemorySnapshot], max_tokens: u64) -> Self {
        Self {
            thread_id: context.id.clone(),
            total_tokens: context.token_usage.total,
            active_message_count: context.messages.len(),
            snapshot_count: snapshots.len(),
            last_snapshot_at: snapshots.iter().map(|s| s.created_at).max(),
            context_utilization: utilization(context.token_usage.total, max_tokens),
        }
    }
}

/// Coarse utilization band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextHealth {
    /// Below 50%.
    Healthy,
    /// 50% up to 80%.
    Moderate,
    /// 80% and above.
    High,
}

impl ContextHealth {
    pub fn from_utilization(utilization: f64) -> Self {
        if utilization >= 80.0 {
            Self::High
        } else if utilization >= 50.0 {
            Self::Moderate
        } else {
            Self::Healthy
        }
    }
}

impl std::fmt::Display for ContextHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Moderate => write!(f, "moderate"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Caller-facing status of a context's memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextStatusReport {
    pub utilization: f64,
    pub total_tokens: u64,
    pub active_messages: usize,
    pub snapshot_count: usize,
    pub status: ContextHealth,
}

impl From<&ContextState> for ContextStatusReport {
    fn from(state: &ContextState) -> Self {
        Self {
            utilization: state.context_utilization,
            total_tokens: state.total_tokens,
            active_messages: state.active_message_count,
            snapshot_count: state.snapshot_count,
            status: ContextHealth::from_utilization(state.context_utilization),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextType, MessageRole};

    fn messages(n: usize, tokens: u32) -> Vec<ContextMessage> {
        let now = Utc::now();
        (0..n)
            .map(|i| {
                ContextMessage::new(
                    MessageRole::User,
                    &format!("message {i}"),
                    tokens,
                    now + chrono::Duration::seconds(i as i64),
                )
            })
            .collect()
    }

    fn response() -> SummaryResponse {
        SummaryResponse {
            summary: "discussed things".into(),
            key_points: vec!["point one".into()],
            entities: vec![],
        }
    }

    #[test]
    fn test_build_covers_range() {
        let msgs = messages(3, 100);
        let snap = MemorySnapshot::build("ctx", &msgs, response(), 20, Utc::now()).unwrap();
        assert_eq!(snap.message_count(), 3);
        assert_eq!(snap.token_count(), 300);
        assert_eq!(snap.compressed_tokens(), 20);
        assert_eq!(snap.first_message_id(), msgs[0].id);
        assert_eq!(snap.last_message_id(), msgs[2].id);
        assert_eq!(snap.compression_ratio(), 15.0);
        assert!(snap.carried_text().contains("- point one"));
    }

    #[test]
    fn test_build_rejects_non_shrinking() {
        let msgs = messages(2, 10);
        let err = MemorySnapshot::build("ctx", &msgs, response(), 20, Utc::now()).unwrap_err();
        assert_eq!(err.kind, CompactionErrorKind::NoShrink);
    }

    #[test]
    fn test_build_rejects_empty() {
        let err = MemorySnapshot::build("ctx", &[], response(), 0, Utc::now()).unwrap_err();
        assert_eq!(err.kind, CompactionErrorKind::EmptyInput);
    }

    #[test]
    fn test_health_bands() {
        assert_eq!(ContextHealth::from_utilization(10.0), ContextHealth::Healthy);
        assert_eq!(ContextHealth::from_utilization(50.0), ContextHealth::Moderate);
        assert_eq!(ContextHealth::from_utilization(79.9), ContextHealth::Moderate);
        assert_eq!(ContextHealth::from_utilization(80.0), ContextHealth::High);
    }

    #[test]
    fn test_state_compute() {
        let mut ctx = Context::new(ContextType::Primary, None, Utc::now());
        for m in messages(4, 250) {
            ctx.push_message(m);
        }
        let state = ContextState::compute(&ctx, &[], 2_000);
        assert_eq!(state.total_tokens, 1_000);
        assert_eq!(state.active_message_count, 4);
        assert_eq!(state.context_utilization, 50.0);
        assert!(state.last_snapshot_at.is_none());
        let report = ContextStatusReport::from(&state);
        assert_eq!(report.status, ContextHealth::Moderate);
    }
}

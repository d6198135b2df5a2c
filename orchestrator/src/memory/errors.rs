//! Compaction error taxonomy.
//!
//! A failed compaction never mutates the context. Retryable kinds are picked
//! up again by the next trigger evaluation; the rest are dropped.

use serde::{Deserialize, Serialize};

/// What went wrong during a compaction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionErrorKind {
    /// Everything is inside the kept window.
    EmptyInput,
    /// Context missing or closed.
    ContextUnavailable,
    /// Collaborator error or an empty summary.
    SummarizationFailed,
    Timeout,
    /// Summary longer than `max_summary_tokens`.
    SummaryTooLarge,
    /// Snapshot at least as large as the messages it replaces.
    NoShrink,
    /// Another compaction already holds the claim.
    ConcurrentModification,
    PersistenceFailed,
    /// Claimed messages were gone at commit time.
    ClaimLost,
}

impl CompactionErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmptyInput => "empty_input",
            Self::ContextUnavailable => "context_unavailable",
            Self::SummarizationFailed => "summarization_failed",
            Self::Timeout => "timeout",
            Self::SummaryTooLarge => "summary_too_large",
            Self::NoShrink => "no_shrink",
            Self::ConcurrentModification => "concurrent_modification",
            Self::PersistenceFailed => "persistence_failed",
            Self::ClaimLost => "claim_lost",
        }
    }

    /// Transient kinds worth another attempt on the next evaluation.
    pub fn is_retryable(self) -> bool {
        match self {
            Self::SummarizationFailed
            | Self::Timeout
            | Self::ConcurrentModification
            | Self::PersistenceFailed
            | Self::ClaimLost => true,
            Self::EmptyInput | Self::ContextUnavailable | Self::SummaryTooLarge | Self::NoShrink => {
                false
            }
        }
    }

    /// Operator hint logged next to the failure.
    pub fn suggested_action(self) -> &'static str {
        match self {
            Self::EmptyInput => "skip: nothing older than the kept window",
            Self::ContextUnavailable => "drop the request: context is gone or closed",
            Self::SummarizationFailed => "retry on the next trigger evaluation",
            Self::Timeout => "retry later or raise summarize_timeout_secs",
            Self::SummaryTooLarge => "lower the summary length or raise max_summary_tokens",
            Self::NoShrink => "discard the summary and retry with a stricter prompt",
            Self::ConcurrentModification => "wait for the running compaction to finish",
            Self::PersistenceFailed => "check the persistence backend and retry",
            Self::ClaimLost => "re-read the context and retry",
        }
    }
}

impl std::fmt::Display for CompactionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token sizes behind a size-related failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenContext {
    /// Weight of the claimed messages.
    pub original: u64,
    /// Weight of the produced summary.
    pub compressed: u64,
}

/// A compaction failure with whatever context was known at the time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionError {
    pub kind: CompactionErrorKind,
    pub detail: String,
    pub context_id: Option<String>,
    /// Size of the claimed range.
    pub message_count: Option<usize>,
    pub token_context: Option<TokenContext>,
}

impl CompactionError {
    pub fn new(kind: CompactionErrorKind, detail: &str) -> Self {
        Self {
            kind,
            detail: detail.to_string(),
            context_id: None,
            message_count: None,
            token_context: None,
        }
    }

    pub fn for_context(self, context_id: &str) -> Self {
        Self {
            context_id: Some(context_id.to_string()),
            ..self
        }
    }

    pub fn with_messages(self, count: usize) -> Self {
        Self {
            message_count: Some(count),
            ..self
        }
    }

    pub fn with_tokens(self, original: u64, compressed: u64) -> Self {
        Self {
            token_context: Some(TokenContext {
                original,
                compressed,
            }),
            ..self
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl std::fmt::Display for CompactionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "compaction {} failed: {}", self.kind, self.detail)?;
        let mut extras = Vec::new();
        if let Some(id) = &self.context_id {
            extras.push(format!("context {id}"));
        }
        if let Some(count) = self.message_count {
            extras.push(format!("{count} messages"));
        }
        if let Some(tokens) = &self.token_context {
            extras.push(format!("tokens {} -> {}", tokens.original, tokens.compressed));
        }
        if !extras.is_empty() {
            write!(f, " ({})", extras.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for CompactionError {}

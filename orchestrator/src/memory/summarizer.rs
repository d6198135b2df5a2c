//! Bounded summarizer contract for context compaction.
//!
//! The request/response types passed to the generation collaborator's
//! `summarize` call, plus response validation. The collaborator itself lives
//! in [`crate::collaborators::generation`].

use serde::{Deserialize, Serialize};

use super::budget::TokenEstimator;
use super::errors::{CompactionError, CompactionErrorKind};
use crate::context::{ContextMessage, MessageRole};
use crate::text::ExtractedEntity;

/// Contract for summarizer input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRequest {
    /// Context being compacted.
    pub context_id: String,
    /// Messages to summarize, oldest first.
    pub messages: Vec<SummaryInputMessage>,
    /// Maximum tokens for the summary output.
    pub max_output_tokens: u32,
    /// Goal of the thread, when set.
    pub goal: Option<String>,
}

impl SummaryRequest {
    /// Total tokens in the input.
    pub fn input_tokens(&self) -> u64 {
        self.messages.iter().map(|m| u64::from(m.tokens)).sum()
    }
}

/// Simplified message for summarizer input (no ids).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryInputMessage {
    pub role: MessageRole,
    pub content: String,
    pub tokens: u32,
}

impl From<&ContextMessage> for SummaryInputMessage {
    fn from(message: &ContextMessage) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
            tokens: message.tokens,
        }
    }
}

/// Contract for summarizer output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryResponse {
    /// The summary text.
    pub summary: String,
    /// Bullet-level facts worth keeping verbatim.
    pub key_points: Vec<String>,
    /// Entities mentioned in the summarized range.
    pub entities: Vec<ExtractedEntity>,
}

impl SummaryResponse {
    /// Tokens of the summary representation (summary plus key points).
    pub fn estimated_tokens(&self, estimator: &dyn TokenEstimator) -> u64 {
        let key_points: u64 = self
            .key_points
            .iter()
            .map(|p| u64::from(estimator.estimate(p)))
            .sum();
        u64::from(estimator.estimate(&self.summary)) + key_points
    }

    /// Validate the response against the request contract.
    ///
    /// Returns the estimated token size of the summary on success.
    pub fn validate(
        &self,
        request: &SummaryRequest,
        estimator: &dyn TokenEstimator,
    ) -> Result<u64, CompactionError> {
        if self.summary.trim().is_empty() {
            return Err(CompactionError::new(
                CompactionErrorKind::SummarizationFailed,
                "summary is empty",
            )
            .for_context(&request.context_id)
            .with_messages(request.messages.len()));
        }

        let tokens = self.estimated_tokens(estimator);
        if tokens > u64::from(request.max_output_tokens) {
            return Err(CompactionError::new(
                CompactionErrorKind::SummaryTooLarge,
                &format!(
                    "summary {} tokens exceeds budget {} tokens",
                    tokens, request.max_output_tokens
                ),
            )
            .for_context(&request.context_id)
            .with_tokens(request.input_tokens(), tokens));
        }

        Ok(tokens)
    }
}

/// Build a SummaryRequest from claimed messages.
pub fn build_summary_request(
    context_id: &str,
    messages: &[ContextMessage],
    max_output_tokens: u32,
    goal: Option<&str>,
) -> SummaryRequest {
    SummaryRequest {
        context_id: context_id.to_string(),
        messages: messages.iter().map(SummaryInputMessage::from).collect(),
        max_output_tokens,
        goal: goal.map(str::to_string),
    }
}

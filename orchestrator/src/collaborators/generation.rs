//! Generation collaborator: the language-model endpoint.
//!
//! The orchestrator never talks to a provider directly. It calls `generate`
//! for replies and `summarize` for compaction through this trait.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::GenerationError;
use crate::memory::{SummaryRequest, SummaryResponse};
use crate::registry::ModelConfig;
use crate::text::{extract_entities, extract_topics, merge_entities, truncate};

/// Key points the mock keeps per summary.
const MOCK_KEY_POINTS: usize = 3;
/// Characters kept per mock key point.
const MOCK_KEY_POINT_CHARS: usize = 80;

/// Language-model endpoint.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Produce a reply for a fully built prompt.
    async fn generate(&self, prompt: &str, config: &ModelConfig) -> Result<String, GenerationError>;

    /// Summarize a range of messages.
    async fn summarize(&self, request: &SummaryRequest) -> Result<SummaryResponse, GenerationError>;
}

/// Behaviour of [`MockGenerationService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockMode {
    #[default]
    Working,
    /// Every call fails.
    Failing,
    /// Summaries come back blank.
    EmptySummary,
}

/// Deterministic generation service for tests and offline runs.
#[derive(Debug, Default)]
pub struct MockGenerationService {
    mode: MockMode,
    generate_calls: AtomicUsize,
    summarize_calls: AtomicUsize,
}

impl MockGenerationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mode: MockMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self::with_mode(MockMode::Failing)
    }

    pub fn empty_summaries() -> Self {
        Self::with_mode(MockMode::EmptySummary)
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn summarize_calls(&self) -> usize {
        self.summarize_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationService for MockGenerationService {
    async fn generate(&self, prompt: &str, config: &ModelConfig) -> Result<String, GenerationError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if self.mode == MockMode::Failing {
            return Err(GenerationError::ModelFailed {
                model: config.model_id.clone(),
                reason: "mock failure".to_string(),
            });
        }
        let last_line = prompt.lines().last().unwrap_or_default();
        Ok(format!(
            "[{}] reply to: {}",
            config.model_id,
            truncate(last_line, MOCK_KEY_POINT_CHARS)
        ))
    }

    async fn summarize(&self, request: &SummaryRequest) -> Result<SummaryResponse, GenerationError> {
        self.summarize_calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            MockMode::Failing => {
                return Err(GenerationError::SummarizationFailed(
                    "mock failure".to_string(),
                ))
            }
            MockMode::EmptySummary => {
                return Ok(SummaryResponse {
                    summary: String::new(),
                    key_points: Vec::new(),
                    entities: Vec::new(),
                })
            }
            MockMode::Working => {}
        }

        let topics = extract_topics(request.messages.iter().map(|m| m.content.as_str()), 5);
        let topic_list = topics.into_iter().collect::<Vec<_>>().join(", ");
        let key_points = request
            .messages
            .iter()
            .take(MOCK_KEY_POINTS)
            .map(|m| truncate(&m.content, MOCK_KEY_POINT_CHARS).to_string())
            .collect();
        let entities = request.messages.iter().fold(Vec::new(), |acc, m| {
            merge_entities(&acc, &extract_entities(&m.content), 20)
        });

        Ok(SummaryResponse {
            summary: format!(
                "Summary of {} messages: {}",
                request.messages.len(),
                topic_list
            ),
            key_points,
            entities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MessageRole;
    use crate::memory::summarizer::SummaryInputMessage;
    use crate::registry::ThinkingLevel;

    fn request(contents: &[&str]) -> SummaryRequest {
        SummaryRequest {
            context_id: "ctx".into(),
            messages: contents
                .iter()
                .map(|c| SummaryInputMessage {
                    role: MessageRole::User,
                    content: c.to_string(),
                    tokens: 10,
                })
                .collect(),
            max_output_tokens: 500,
            goal: None,
        }
    }

    fn config() -> ModelConfig {
        ModelConfig {
            model_id: "mock-model".into(),
            temperature: 0.7,
            max_output_tokens: 1024,
            thinking_level: ThinkingLevel::Off,
        }
    }

    #[tokio::test]
    async fn test_mock_summarize_counts_messages() {
        let service = MockGenerationService::new();
        let resp = service
            .summarize(&request(&["planning the roadmap", "roadmap review with @alice"]))
            .await
            .unwrap();
        assert!(resp.summary.starts_with("Summary of 2 messages"));
        assert!(resp.summary.contains("roadmap"));
        assert_eq!(resp.key_points.len(), 2);
        assert!(resp.entities.iter().any(|e| e.normalized == "alice"));
        assert_eq!(service.summarize_calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_mode() {
        let service = MockGenerationService::failing();
        assert!(service.summarize(&request(&["x"])).await.is_err());
        assert!(matches!(
            service.generate("hi", &config()).await,
            Err(GenerationError::ModelFailed { .. })
        ));
        assert_eq!(service.generate_calls(), 1);
    }

    #[tokio::test]
    async fn test_empty_summary_mode() {
        let service = MockGenerationService::empty_summaries();
        let resp = service.summarize(&request(&["x"])).await.unwrap();
        assert!(resp.summary.is_empty());
    }

    #[tokio::test]
    async fn test_generate_echoes_last_line() {
        let service = MockGenerationService::new();
        let reply = service
            .generate("context\nuser: what next?", &config())
            .await
            .unwrap();
        assert_eq!(reply, "[mock-model] reply to: user: what next?");
    }
}

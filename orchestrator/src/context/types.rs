//! Context data model: threads, messages, derived summary, task references.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::text::{extract_entities, extract_topics, merge_entities, ExtractedEntity};

/// Topics kept in a context summary.
pub const SUMMARY_TOPIC_LIMIT: usize = 12;
/// Entities kept in a context summary.
pub const SUMMARY_ENTITY_LIMIT: usize = 40;

/// Kind of conversation thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    #[default]
    Primary,
    Task,
    Specialist,
    Background,
    External,
}

impl ContextType {
    pub fn all() -> &'static [ContextType] {
        &[
            Self::Primary,
            Self::Task,
            Self::Specialist,
            Self::Background,
            Self::External,
        ]
    }
}

impl std::fmt::Display for ContextType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Task => write!(f, "task"),
            Self::Specialist => write!(f, "specialist"),
            Self::Background => write!(f, "background"),
            Self::External => write!(f, "external"),
        }
    }
}

impl std::str::FromStr for ContextType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "primary" => Ok(Self::Primary),
            "task" => Ok(Self::Task),
            "specialist" => Ok(Self::Specialist),
            "background" => Ok(Self::Background),
            "external" => Ok(Self::External),
            other => Err(format!("unknown context type: {other}")),
        }
    }
}

/// Lifecycle status.
///
/// ```text
/// active ⇄ paused
/// active | paused → archived
/// any → failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextStatus {
    Active,
    Paused,
    Archived,
    Failed,
}

impl ContextStatus {
    /// Active or paused.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Active | Self::Paused)
    }

    /// Whether `self → to` is a legal transition.
    pub fn can_transition_to(self, to: ContextStatus) -> bool {
        match (self, to) {
            (Self::Active, Self::Paused) | (Self::Paused, Self::Active) => true,
            (Self::Active | Self::Paused, Self::Archived) => true,
            (Self::Active | Self::Paused | Self::Archived, Self::Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ContextStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Archived => write!(f, "archived"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

/// One message in a context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Estimated token weight.
    pub tokens: u32,
}

impl ContextMessage {
    pub fn new(role: MessageRole, content: &str, tokens: u32, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.to_string(),
            timestamp,
            tokens,
        }
    }
}

/// Derived topics and entities, recomputed from content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextSummary {
    pub topics: BTreeSet<String>,
    pub entities: Vec<ExtractedEntity>,
}

impl ContextSummary {
    /// Normalised entity values.
    pub fn entity_set(&self) -> BTreeSet<String> {
        self.entities.iter().map(|e| e.normalized.clone()).collect()
    }
}

/// References to externally owned tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRefs {
    pub pending: Vec<String>,
    pub active: Vec<String>,
}

impl TaskRefs {
    pub fn has_any(&self) -> bool {
        !self.pending.is_empty() || !self.active.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len() + self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_any()
    }

    /// Union preserving first-seen order.
    pub fn union(&self, other: &TaskRefs) -> TaskRefs {
        fn merge(a: &[String], b: &[String]) -> Vec<String> {
            let mut seen = BTreeSet::new();
            a.iter()
                .chain(b.iter())
                .filter(|id| seen.insert(id.as_str()))
                .cloned()
                .collect()
        }
        TaskRefs {
            pending: merge(&self.pending, &other.pending),
            active: merge(&self.active, &other.active),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens of the messages currently held.
    pub total: u64,
}

/// A single conversation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub id: String,
    pub context_type: ContextType,
    pub status: ContextStatus,
    pub goal: Option<String>,
    pub messages: Vec<ContextMessage>,
    pub summary: ContextSummary,
    pub tasks: TaskRefs,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub token_usage: TokenUsage,
    /// Set when this context was merged into another.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_into: Option<String>,
}

impl Context {
    pub fn new(context_type: ContextType, goal: Option<String>, now: DateTime<Utc>) -> Self {
        Self::with_id(&Uuid::new_v4().to_string(), context_type, goal, now)
    }

    pub fn with_id(
        id: &str,
        context_type: ContextType,
        goal: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut context = Self {
            id: id.to_string(),
            context_type,
            status: ContextStatus::Active,
            goal: goal.filter(|g| !g.trim().is_empty()),
            messages: Vec::new(),
            summary: ContextSummary::default(),
            tasks: TaskRefs::default(),
            created_at: now,
            last_active_at: now,
            token_usage: TokenUsage::default(),
            merged_into: None,
        };
        context.recompute_summary(&[]);
        context
    }

    /// Append a message and account for its tokens.
    pub fn push_message(&mut self, message: ContextMessage) {
        if message.timestamp > self.last_active_at {
            self.last_active_at = message.timestamp;
        }
        self.token_usage.total += u64::from(message.tokens);
        self.messages.push(message);
    }

    /// Most recent `n` messages, oldest first.
    pub fn recent_messages(&self, n: usize) -> &[ContextMessage] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// Recompute topics and entities from goal, messages, and carried-over text
    /// (snapshot summaries of compacted history).
    pub fn recompute_summary(&mut self, carried: &[&str]) {
        let texts: Vec<&str> = self
            .goal
            .iter()
            .map(String::as_str)
            .chain(carried.iter().copied())
            .chain(self.messages.iter().map(|m| m.content.as_str()))
            .collect();

        let topics = extract_topics(texts.iter().copied(), SUMMARY_TOPIC_LIMIT);
        let entities = texts.iter().fold(Vec::new(), |acc, text| {
            merge_entities(&acc, &extract_entities(text), SUMMARY_ENTITY_LIMIT)
        });

        self.summary = ContextSummary { topics, entities };
    }

    /// Recompute the token total from the messages held.
    pub fn recount_tokens(&mut self) {
        self.token_usage.total = self.messages.iter().map(|m| u64::from(m.tokens)).sum();
    }
}

//! Persistence collaborator: durable storage of contexts, snapshots, and state.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::context::Context;
use crate::error::PersistenceError;
use crate::memory::{ContextState, MemorySnapshot};

/// Storage backend for contexts and their compaction history.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn load_context(&self, context_id: &str) -> Result<Option<Context>, PersistenceError>;

    async fn save_context(&self, context: &Context) -> Result<(), PersistenceError>;

    /// Append an immutable snapshot to a context's history.
    async fn append_snapshot(&self, snapshot: &MemorySnapshot) -> Result<(), PersistenceError>;

    /// Snapshots of a context, oldest first.
    async fn load_snapshots(&self, context_id: &str)
        -> Result<Vec<MemorySnapshot>, PersistenceError>;

    async fn load_context_state(
        &self,
        context_id: &str,
    ) -> Result<Option<ContextState>, PersistenceError>;

    async fn save_context_state(&self, state: &ContextState) -> Result<(), PersistenceError>;
}

/// JSON-in-memory persistence.
///
/// Every record goes through `serde_json` so tests exercise the same
/// round trip a real backend would.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    contexts: RwLock<HashMap<String, String>>,
    snapshots: RwLock<HashMap<String, Vec<String>>>,
    states: RwLock<HashMap<String, String>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn context_count(&self) -> usize {
        self.contexts.read().await.len()
    }

    pub async fn snapshot_count(&self, context_id: &str) -> usize {
        self.snapshots
            .read()
            .await
            .get(context_id)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl PersistenceStore for InMemoryPersistence {
    async fn load_context(&self, context_id: &str) -> Result<Option<Context>, PersistenceError> {
        match self.contexts.read().await.get(context_id) {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    async fn save_context(&self, context: &Context) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(context)?;
        self.contexts.write().await.insert(context.id.clone(), json);
        debug!(context_id = %context.id, "Context saved");
        Ok(())
    }

    async fn append_snapshot(&self, snapshot: &MemorySnapshot) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(snapshot)?;
        self.snapshots
            .write()
            .await
            .entry(snapshot.thread_id().to_string())
            .or_default()
            .push(json);
        debug!(
            context_id = %snapshot.thread_id(),
            snapshot_id = %snapshot.id(),
            "Snapshot appended"
        );
        Ok(())
    }

    async fn load_snapshots(
        &self,
        context_id: &str,
    ) -> Result<Vec<MemorySnapshot>, PersistenceError> {
        let guard = self.snapshots.read().await;
        let Some(rows) = guard.get(context_id) else {
            return Ok(Vec::new());
        };
        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(PersistenceError::from))
            .collect()
    }

    async fn load_context_state(
        &self,
        context_id: &str,
    ) -> Result<Option<ContextState>, PersistenceError> {
        match self.states.read().await.get(context_id) {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    async fn save_context_state(&self, state: &ContextState) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(state)?;
        self.states
            .write()
            .await
            .insert(state.thread_id.clone(), json);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextMessage, ContextType, MessageRole};
    use crate::memory::SummaryResponse;
    use chrono::Utc;

    #[tokio::test]
    async fn test_context_round_trip() {
        let store = InMemoryPersistence::new();
        let mut ctx = Context::new(ContextType::Task, Some("ship v2".into()), Utc::now());
        ctx.push_message(ContextMessage::new(MessageRole::User, "hello", 2, Utc::now()));

        store.save_context(&ctx).await.unwrap();
        let loaded = store.load_context(&ctx.id).await.unwrap().unwrap();
        assert_eq!(loaded, ctx);
        assert!(store.load_context("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_snapshots_append_in_order() {
        let store = InMemoryPersistence::new();
        let now = Utc::now();
        let messages: Vec<ContextMessage> = (0..3)
            .map(|i| ContextMessage::new(MessageRole::User, &format!("message {i}"), 50, now))
            .collect();
        let response = SummaryResponse {
            summary: "short".into(),
            key_points: vec![],
            entities: vec![],
        };
        let first = MemorySnapshot::build("ctx", &messages, response.clone(), 5, now).unwrap();
        let second = MemorySnapshot::build("ctx", &messages, response, 5, now).unwrap();

        store.append_snapshot(&first).await.unwrap();
        store.append_snapshot(&second).await.unwrap();

        let loaded = store.load_snapshots("ctx").await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id(), first.id());
        assert_eq!(store.snapshot_count("ctx").await, 2);
        assert!(store.load_snapshots("other").await.unwrap().is_empty());
    }
}

//! Task source collaborator: read-only view of externally owned tasks.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::context::TaskRefs;
use crate::error::TaskSourceError;

/// Pending and active task ids per context.
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn tasks_for(&self, context_id: &str) -> Result<TaskRefs, TaskSourceError>;
}

/// Task source backed by a map; contexts without an entry have no tasks.
#[derive(Debug, Default)]
pub struct StaticTaskSource {
    tasks: RwLock<HashMap<String, TaskRefs>>,
}

impl StaticTaskSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, context_id: &str, tasks: TaskRefs) {
        self.tasks.write().await.insert(context_id.to_string(), tasks);
    }

    pub async fn clear(&self, context_id: &str) {
        self.tasks.write().await.remove(context_id);
    }
}

#[async_trait]
impl TaskSource for StaticTaskSource {
    async fn tasks_for(&self, context_id: &str) -> Result<TaskRefs, TaskSourceError> {
        Ok(self
            .tasks
            .read()
            .await
            .get(context_id)
            .cloned()
            .unwrap_or_default())
    }
}

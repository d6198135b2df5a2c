//! Context store: shared map of live contexts with per-context locking.
//!
//! The map sits behind a `RwLock`; each context has its own `Mutex`, so
//! mutations serialize per context id while reads across the whole set only
//! take the map's read lock plus each context lock briefly.
//!
//! Compaction uses a claim/commit protocol: [`ContextStore::claim_compaction`]
//! flags the context and copies the eligible range, the caller summarizes
//! without holding any lock, then [`ContextStore::commit_compaction`] or
//! [`ContextStore::release_compaction`] finishes the claim.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use super::types::{Context, ContextMessage, ContextStatus, ContextType, MessageRole, TaskRefs};
use crate::clock::SharedClock;
use crate::error::{StoreError, StoreResult};
use crate::memory::{
    ContextState, ContextStatusReport, MemorySnapshot, TokenEstimator, WordCountEstimator,
};

struct ContextEntry {
    context: Context,
    snapshots: Vec<MemorySnapshot>,
    compacting: bool,
}

impl ContextEntry {
    fn new(context: Context) -> Self {
        Self {
            context,
            snapshots: Vec::new(),
            compacting: false,
        }
    }

    fn recompute_summary(&mut self) {
        let carried: Vec<String> = self.snapshots.iter().map(|s| s.carried_text()).collect();
        let carried: Vec<&str> = carried.iter().map(String::as_str).collect();
        self.context.recompute_summary(&carried);
    }
}

type SharedEntry = Arc<Mutex<ContextEntry>>;

/// Messages claimed for compaction.
#[derive(Debug, Clone)]
pub struct CompactionClaim {
    pub context_id: String,
    pub goal: Option<String>,
    /// Oldest messages, excluding the most recent ones kept.
    pub messages: Vec<ContextMessage>,
}

impl CompactionClaim {
    pub fn tokens(&self) -> u64 {
        self.messages.iter().map(|m| u64::from(m.tokens)).sum()
    }
}

/// Injected, explicitly owned store of all contexts.
pub struct ContextStore {
    contexts: RwLock<HashMap<String, SharedEntry>>,
    clock: SharedClock,
    estimator: Arc<dyn TokenEstimator>,
    max_context_tokens: u64,
}

impl ContextStore {
    pub fn new(clock: SharedClock, max_context_tokens: u64) -> Self {
        Self::with_estimator(clock, max_context_tokens, Arc::new(WordCountEstimator::default()))
    }

    pub fn with_estimator(
        clock: SharedClock,
        max_context_tokens: u64,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
            clock,
            estimator,
            max_context_tokens,
        }
    }

    pub fn max_context_tokens(&self) -> u64 {
        self.max_context_tokens
    }

    pub fn estimator(&self) -> &dyn TokenEstimator {
        self.estimator.as_ref()
    }

    async fn entry(&self, id: &str) -> StoreResult<SharedEntry> {
        self.contexts
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Create a new active context.
    pub async fn create(&self, context_type: ContextType, goal: Option<String>) -> Context {
        let context = Context::new(context_type, goal, self.clock.now());
        let id = context.id.clone();
        self.contexts
            .write()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(ContextEntry::new(context.clone()))));
        info!(context_id = %id, context_type = %context_type, "Context created");
        context
    }

    /// Insert an existing context (e.g. loaded from persistence).
    pub async fn insert(&self, context: Context) -> StoreResult<()> {
        self.insert_with_snapshots(context, Vec::new()).await
    }

    /// Insert an existing context together with its snapshot history.
    pub async fn insert_with_snapshots(
        &self,
        context: Context,
        snapshots: Vec<MemorySnapshot>,
    ) -> StoreResult<()> {
        let mut map = self.contexts.write().await;
        if map.contains_key(&context.id) {
            return Err(StoreError::AlreadyExists(context.id));
        }
        let id = context.id.clone();
        let mut entry = ContextEntry::new(context);
        entry.snapshots = snapshots;
        map.insert(id.clone(), Arc::new(Mutex::new(entry)));
        debug!(context_id = %id, "Context inserted");
        Ok(())
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.contexts.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.contexts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.contexts.read().await.is_empty()
    }

    /// Clone of one context.
    pub async fn get(&self, id: &str) -> StoreResult<Context> {
        let entry = self.entry(id).await?;
        let guard = entry.lock().await;
        Ok(guard.context.clone())
    }

    /// Consistent-per-context view of every context, sorted by id.
    pub async fn snapshot_all(&self) -> Vec<Context> {
        let entries: Vec<SharedEntry> = self.contexts.read().await.values().cloned().collect();
        let mut contexts = Vec::with_capacity(entries.len());
        for entry in entries {
            contexts.push(entry.lock().await.context.clone());
        }
        contexts.sort_by(|a, b| a.id.cmp(&b.id));
        contexts
    }

    /// Append a message with an estimated token weight.
    pub async fn append_message(
        &self,
        id: &str,
        role: MessageRole,
        content: &str,
    ) -> StoreResult<ContextMessage> {
        let tokens = self.estimator.estimate(content);
        self.append_with_tokens(id, role, content, tokens).await
    }

    /// Append a message with a known token weight.
    ///
    /// Appending to a paused context resumes it; closed contexts reject the
    /// message. Appends are accepted while a compaction is in flight.
    pub async fn append_with_tokens(
        &self,
        id: &str,
        role: MessageRole,
        content: &str,
        tokens: u32,
    ) -> StoreResult<ContextMessage> {
        let entry = self.entry(id).await?;
        let mut guard = entry.lock().await;

        match guard.context.status {
            ContextStatus::Active => {}
            ContextStatus::Paused => {
                guard.context.status = ContextStatus::Active;
                info!(context_id = %id, "Paused context resumed by new message");
            }
            status @ (ContextStatus::Archived | ContextStatus::Failed) => {
                return Err(StoreError::Closed {
                    id: id.to_string(),
                    status,
                });
            }
        }

        let message = ContextMessage::new(role, content, tokens, self.clock.now());
        guard.context.push_message(message.clone());
        guard.recompute_summary();
        debug!(
            context_id = %id,
            tokens,
            total_tokens = guard.context.token_usage.total,
            "Message appended"
        );
        Ok(message)
    }

    /// Move a context to a new status.
    pub async fn transition(&self, id: &str, to: ContextStatus) -> StoreResult<Context> {
        let entry = self.entry(id).await?;
        let mut guard = entry.lock().await;
        let from = guard.context.status;
        if !from.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                id: id.to_string(),
                from,
                to,
            });
        }
        guard.context.status = to;
        info!(context_id = %id, %from, %to, "Context status changed");
        Ok(guard.context.clone())
    }

    pub async fn pause(&self, id: &str) -> StoreResult<Context> {
        self.transition(id, ContextStatus::Paused).await
    }

    pub async fn resume(&self, id: &str) -> StoreResult<Context> {
        let context = self.transition(id, ContextStatus::Active).await?;
        self.touch(id).await?;
        Ok(context)
    }

    pub async fn archive(&self, id: &str) -> StoreResult<Context> {
        self.transition(id, ContextStatus::Archived).await
    }

    pub async fn fail(&self, id: &str) -> StoreResult<Context> {
        self.transition(id, ContextStatus::Failed).await
    }

    /// Mark a context as just used.
    pub async fn touch(&self, id: &str) -> StoreResult<()> {
        let entry = self.entry(id).await?;
        entry.lock().await.context.last_active_at = self.clock.now();
        Ok(())
    }

    /// Replace the task references of a context.
    pub async fn update_tasks(&self, id: &str, tasks: TaskRefs) -> StoreResult<()> {
        let entry = self.entry(id).await?;
        entry.lock().await.context.tasks = tasks;
        Ok(())
    }

    /// Set or replace the goal of a context.
    pub async fn set_goal(&self, id: &str, goal: Option<String>) -> StoreResult<()> {
        let entry = self.entry(id).await?;
        let mut guard = entry.lock().await;
        guard.context.goal = goal.filter(|g| !g.trim().is_empty());
        guard.recompute_summary();
        Ok(())
    }

    /// Merge `source` into `target`.
    ///
    /// Messages move to the target in timestamp order, tasks and snapshots are
    /// unioned, and the source is archived with `merged_into` set. Rejected
    /// while either side is compacting.
    pub async fn merge(&self, source_id: &str, target_id: &str) -> StoreResult<Context> {
        if source_id == target_id {
            return Err(StoreError::SelfMerge(source_id.to_string()));
        }
        let source = self.entry(source_id).await?;
        let target = self.entry(target_id).await?;

        // Lock in id order so concurrent merges cannot deadlock.
        let (mut source_guard, mut target_guard) = if source_id < target_id {
            let s = source.lock().await;
            let t = target.lock().await;
            (s, t)
        } else {
            let t = target.lock().await;
            let s = source.lock().await;
            (s, t)
        };

        for (id, entry) in [(source_id, &*source_guard), (target_id, &*target_guard)] {
            if entry.compacting {
                return Err(StoreError::CompactionInProgress(id.to_string()));
            }
            if !entry.context.status.is_open() {
                return Err(StoreError::Closed {
                    id: id.to_string(),
                    status: entry.context.status,
                });
            }
        }

        let moved: Vec<ContextMessage> = std::mem::take(&mut source_guard.context.messages);
        let moved_count = moved.len();
        let target_ctx = &mut target_guard.context;
        target_ctx.messages.extend(moved);
        target_ctx.messages.sort_by_key(|m| m.timestamp);
        target_ctx.recount_tokens();
        target_ctx.tasks = target_ctx.tasks.union(&source_guard.context.tasks);
        if target_ctx.goal.is_none() {
            target_ctx.goal = source_guard.context.goal.clone();
        }
        if source_guard.context.last_active_at > target_ctx.last_active_at {
            target_ctx.last_active_at = source_guard.context.last_active_at;
        }
        if target_ctx.status == ContextStatus::Paused {
            target_ctx.status = ContextStatus::Active;
        }

        let source_snapshots = source_guard.snapshots.clone();
        target_guard.snapshots.extend(source_snapshots);
        target_guard.recompute_summary();

        let source_ctx = &mut source_guard.context;
        source_ctx.recount_tokens();
        source_ctx.tasks = TaskRefs::default();
        source_ctx.status = ContextStatus::Archived;
        source_ctx.merged_into = Some(target_id.to_string());

        info!(
            source = %source_id,
            target = %target_id,
            moved_messages = moved_count,
            "Contexts merged"
        );
        Ok(target_guard.context.clone())
    }

    /// Pause active contexts idle for longer than `idle`. Returns paused ids.
    pub async fn auto_pause_idle(&self, idle: Duration) -> Vec<String> {
        let now = self.clock.now();
        let entries: Vec<(String, SharedEntry)> = self
            .contexts
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut paused = Vec::new();
        for (id, entry) in entries {
            let mut guard = entry.lock().await;
            if guard.context.status == ContextStatus::Active
                && now - guard.context.last_active_at > idle
            {
                guard.context.status = ContextStatus::Paused;
                info!(context_id = %id, "Idle context auto-paused");
                paused.push(id);
            }
        }
        paused.sort();
        paused
    }

    /// Archive open contexts inactive for more than `after_days`. Returns archived ids.
    pub async fn archive_stale(&self, after_days: i64) -> Vec<String> {
        let now = self.clock.now();
        let cutoff = Duration::days(after_days);
        let entries: Vec<(String, SharedEntry)> = self
            .contexts
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut archived = Vec::new();
        for (id, entry) in entries {
            let mut guard = entry.lock().await;
            if guard.context.status.is_open()
                && !guard.compacting
                && now - guard.context.last_active_at > cutoff
            {
                guard.context.status = ContextStatus::Archived;
                info!(context_id = %id, after_days, "Stale context archived");
                archived.push(id);
            }
        }
        archived.sort();
        archived
    }

    /// Current rollup for a context.
    pub async fn context_state(&self, id: &str) -> StoreResult<ContextState> {
        let entry = self.entry(id).await?;
        let guard = entry.lock().await;
        Ok(ContextState::compute(
            &guard.context,
            &guard.snapshots,
            self.max_context_tokens,
        ))
    }

    /// Caller-facing status report.
    pub async fn status_report(&self, id: &str) -> StoreResult<ContextStatusReport> {
        Ok(ContextStatusReport::from(&self.context_state(id).await?))
    }

    /// Snapshot history of a context, oldest first.
    pub async fn snapshots(&self, id: &str) -> StoreResult<Vec<MemorySnapshot>> {
        let entry = self.entry(id).await?;
        let guard = entry.lock().await;
        Ok(guard.snapshots.clone())
    }

    /// Whether a compaction currently holds the context.
    pub async fn is_compacting(&self, id: &str) -> StoreResult<bool> {
        let entry = self.entry(id).await?;
        let guard = entry.lock().await;
        Ok(guard.compacting)
    }

    /// Claim the oldest messages (all but `keep_recent`) for compaction.
    pub async fn claim_compaction(
        &self,
        id: &str,
        keep_recent: usize,
    ) -> StoreResult<CompactionClaim> {
        let entry = self.entry(id).await?;
        let mut guard = entry.lock().await;
        if guard.compacting {
            return Err(StoreError::CompactionInProgress(id.to_string()));
        }
        if !guard.context.status.is_open() {
            return Err(StoreError::Closed {
                id: id.to_string(),
                status: guard.context.status,
            });
        }

        let eligible = guard.context.messages.len().saturating_sub(keep_recent);
        let messages = guard.context.messages[..eligible].to_vec();
        guard.compacting = true;
        debug!(context_id = %id, claimed = eligible, "Compaction claimed");

        Ok(CompactionClaim {
            context_id: id.to_string(),
            goal: guard.context.goal.clone(),
            messages,
        })
    }

    /// Commit a snapshot for a claim: drop the covered messages and record it.
    ///
    /// Fails with `NotFound` if any claimed message is no longer present; the
    /// claim is released either way.
    pub async fn commit_compaction(
        &self,
        claim: &CompactionClaim,
        snapshot: MemorySnapshot,
    ) -> StoreResult<ContextState> {
        let entry = self.entry(&claim.context_id).await?;
        let mut guard = entry.lock().await;
        guard.compacting = false;

        let claimed: BTreeSet<&str> = claim.messages.iter().map(|m| m.id.as_str()).collect();
        let present = guard
            .context
            .messages
            .iter()
            .filter(|m| claimed.contains(m.id.as_str()))
            .count();
        if present != claimed.len() {
            return Err(StoreError::NotFound(format!(
                "{} of {} claimed messages in {}",
                claimed.len() - present,
                claimed.len(),
                claim.context_id
            )));
        }

        guard
            .context
            .messages
            .retain(|m| !claimed.contains(m.id.as_str()));
        guard.context.recount_tokens();
        guard.snapshots.push(snapshot);
        guard.recompute_summary();

        let state = ContextState::compute(&guard.context, &guard.snapshots, self.max_context_tokens);
        info!(
            context_id = %claim.context_id,
            compacted = claimed.len(),
            remaining = state.active_message_count,
            utilization = state.context_utilization,
            "Compaction committed"
        );
        Ok(state)
    }

    /// Release a claim without mutating the context.
    pub async fn release_compaction(&self, id: &str) -> StoreResult<()> {
        let entry = self.entry(id).await?;
        entry.lock().await.compacting = false;
        debug!(context_id = %id, "Compaction claim released");
        Ok(())
    }
}

//! Context compactor: replaces the oldest messages of a context with an
//! immutable summary snapshot.
//!
//! Ties together the budget trigger, the generation collaborator's
//! `summarize`, persistence, and the store's claim/commit protocol:
//!
//! 1. Claim the eligible range under the per-context lock, then release it.
//! 2. Summarize without holding any lock (bounded by the configured deadline).
//! 3. Validate the summary and build the snapshot.
//! 4. Persist the snapshot, then commit it under the lock.
//!
//! Any failure releases the claim and leaves the context untouched; the next
//! trigger evaluation retries.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn, Instrument};

use super::budget::{BudgetDecision, CompactionSettings, CompactionTrigger};
use super::errors::{CompactionError, CompactionErrorKind};
use super::snapshot::{ContextState, MemorySnapshot};
use super::summarizer::build_summary_request;
use crate::clock::SharedClock;
use crate::collaborators::{GenerationService, PersistenceStore};
use crate::context::{CompactionClaim, ContextStore};
use crate::error::StoreError;
use crate::events::{OrchestratorEvent, SharedEventBus};
use crate::telemetry;

/// Result of a compaction attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompactionOutcome {
    /// The trigger did not fire.
    Skipped {
        context_id: String,
        decision: BudgetDecision,
    },
    /// A snapshot was committed.
    Compacted {
        snapshot: MemorySnapshot,
        state: ContextState,
    },
}

impl CompactionOutcome {
    pub fn is_compacted(&self) -> bool {
        matches!(self, Self::Compacted { .. })
    }

    pub fn snapshot(&self) -> Option<&MemorySnapshot> {
        match self {
            Self::Compacted { snapshot, .. } => Some(snapshot),
            Self::Skipped { .. } => None,
        }
    }
}

/// Runs compaction against a shared context store.
pub struct ContextCompactor {
    trigger: CompactionTrigger,
    store: Arc<ContextStore>,
    generator: Arc<dyn GenerationService>,
    persistence: Arc<dyn PersistenceStore>,
    events: Option<SharedEventBus>,
    clock: SharedClock,
}

impl ContextCompactor {
    pub fn new(
        settings: CompactionSettings,
        store: Arc<ContextStore>,
        generator: Arc<dyn GenerationService>,
        persistence: Arc<dyn PersistenceStore>,
        clock: SharedClock,
    ) -> Self {
        Self {
            trigger: CompactionTrigger::new(settings),
            store,
            generator,
            persistence,
            events: None,
            clock,
        }
    }

    /// Publish started/completed/failed events on this bus.
    pub fn with_events(mut self, events: SharedEventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn settings(&self) -> &CompactionSettings {
        self.trigger.settings()
    }

    pub fn store(&self) -> &Arc<ContextStore> {
        &self.store
    }

    pub fn events(&self) -> Option<&SharedEventBus> {
        self.events.as_ref()
    }

    /// Evaluate the trigger for a context without compacting.
    pub async fn evaluate(&self, context_id: &str) -> Result<BudgetDecision, CompactionError> {
        let state = self
            .store
            .context_state(context_id)
            .await
            .map_err(|e| store_error(context_id, e))?;
        Ok(self
            .trigger
            .evaluate(state.context_utilization, state.active_message_count))
    }

    /// Compact if the trigger fires.
    pub async fn compact(&self, context_id: &str) -> Result<CompactionOutcome, CompactionError> {
        let decision = self.evaluate(context_id).await?;
        if !decision.should_compact() {
            debug!(context_id, decision = %decision, "Compaction not required");
            return Ok(CompactionOutcome::Skipped {
                context_id: context_id.to_string(),
                decision,
            });
        }
        self.compact_now(context_id).await
    }

    /// Compact regardless of utilization. The most recent messages are still
    /// kept.
    pub async fn compact_now(&self, context_id: &str) -> Result<CompactionOutcome, CompactionError> {
        let keep_recent = self.settings().keep_recent_messages;
        let span = telemetry::compaction_span(context_id, keep_recent);
        let result = self
            .run_compaction(context_id, keep_recent)
            .instrument(span.clone())
            .await;
        telemetry::record_compaction_result(&span, &result);
        result
    }

    async fn run_compaction(
        &self,
        context_id: &str,
        keep_recent: usize,
    ) -> Result<CompactionOutcome, CompactionError> {
        let claim = self
            .store
            .claim_compaction(context_id, keep_recent)
            .await
            .map_err(|e| store_error(context_id, e))?;

        if claim.messages.is_empty() {
            self.release(context_id).await;
            return Err(CompactionError::new(
                CompactionErrorKind::EmptyInput,
                "no messages older than the kept window",
            )
            .for_context(context_id));
        }

        info!(
            context_id,
            messages = claim.messages.len(),
            tokens = claim.tokens(),
            "Compaction started"
        );
        self.publish(OrchestratorEvent::CompactionStarted {
            context_id: context_id.to_string(),
            message_count: claim.messages.len(),
            timestamp: self.clock.now(),
        });

        match self.summarize_and_commit(&claim).await {
            Ok((snapshot, state)) => {
                info!(
                    context_id,
                    snapshot_id = %snapshot.id(),
                    compacted = snapshot.message_count(),
                    original_tokens = snapshot.token_count(),
                    compressed_tokens = snapshot.compressed_tokens(),
                    utilization = state.context_utilization,
                    "Compaction completed"
                );
                self.publish(OrchestratorEvent::CompactionCompleted {
                    context_id: context_id.to_string(),
                    snapshot_id: snapshot.id().to_string(),
                    messages_compacted: snapshot.message_count(),
                    utilization_after: state.context_utilization,
                    timestamp: self.clock.now(),
                });
                Ok(CompactionOutcome::Compacted { snapshot, state })
            }
            Err(err) => {
                self.release(context_id).await;
                warn!(
                    context_id,
                    kind = %err.kind,
                    retryable = err.is_retryable(),
                    action = err.kind.suggested_action(),
                    "Compaction failed: {}",
                    err.detail
                );
                self.publish(OrchestratorEvent::CompactionFailed {
                    context_id: context_id.to_string(),
                    kind: err.kind,
                    detail: err.detail.clone(),
                    timestamp: self.clock.now(),
                });
                Err(err)
            }
        }
    }

    async fn summarize_and_commit(
        &self,
        claim: &CompactionClaim,
    ) -> Result<(MemorySnapshot, ContextState), CompactionError> {
        let settings = self.settings();
        let context_id = claim.context_id.as_str();
        let request = build_summary_request(
            context_id,
            &claim.messages,
            settings.max_summary_tokens,
            claim.goal.as_deref(),
        );

        let call = self.generator.summarize(&request);
        let result = match settings.summarize_timeout_secs {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), call)
                .await
                .map_err(|_| {
                    CompactionError::new(
                        CompactionErrorKind::Timeout,
                        &format!("summarization exceeded {secs}s"),
                    )
                    .for_context(context_id)
                    .with_messages(claim.messages.len())
                })?,
            None => call.await,
        };
        let response = result.map_err(|e| {
            CompactionError::new(CompactionErrorKind::SummarizationFailed, &e.to_string())
                .for_context(context_id)
                .with_messages(claim.messages.len())
        })?;

        let compressed = response.validate(&request, self.store.estimator())?;
        let snapshot = MemorySnapshot::build(
            context_id,
            &claim.messages,
            response,
            compressed,
            self.clock.now(),
        )?;

        self.persistence
            .append_snapshot(&snapshot)
            .await
            .map_err(|e| {
                CompactionError::new(CompactionErrorKind::PersistenceFailed, &e.to_string())
                    .for_context(context_id)
            })?;

        let state = self
            .store
            .commit_compaction(claim, snapshot.clone())
            .await
            .map_err(|e| match e {
                StoreError::NotFound(detail) => {
                    CompactionError::new(CompactionErrorKind::ClaimLost, &detail)
                        .for_context(context_id)
                }
                other => store_error(context_id, other),
            })?;

        if let Err(e) = self.persistence.save_context_state(&state).await {
            warn!(context_id, error = %e, "Failed to persist context state after compaction");
        }

        Ok((snapshot, state))
    }

    async fn release(&self, context_id: &str) {
        if let Err(e) = self.store.release_compaction(context_id).await {
            debug!(context_id, error = %e, "Compaction claim release skipped");
        }
    }

    fn publish(&self, event: OrchestratorEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}

fn store_error(context_id: &str, err: StoreError) -> CompactionError {
    let kind = match err {
        StoreError::CompactionInProgress(_) => CompactionErrorKind::ConcurrentModification,
        _ => CompactionErrorKind::ContextUnavailable,
    };
    CompactionError::new(kind, &err.to_string()).for_context(context_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::collaborators::{InMemoryPersistence, MockGenerationService};
    use crate::context::{ContextType, MessageRole};
    use crate::error::{GenerationError, PersistenceError};
    use crate::events::EventBus;
    use crate::memory::{SummaryRequest, SummaryResponse};
    use crate::registry::ModelConfig;
    use async_trait::async_trait;

    struct Fixture {
        store: Arc<ContextStore>,
        persistence: Arc<InMemoryPersistence>,
        clock: SharedClock,
    }

    fn fixture() -> Fixture {
        let clock: SharedClock = Arc::new(ManualClock::starting_now());
        Fixture {
            store: Arc::new(ContextStore::new(clock.clone(), 100_000)),
            persistence: Arc::new(InMemoryPersistence::new()),
            clock,
        }
    }

    fn compactor(f: &Fixture, generator: Arc<dyn GenerationService>) -> ContextCompactor {
        ContextCompactor::new(
            CompactionSettings::default(),
            f.store.clone(),
            generator,
            f.persistence.clone(),
            f.clock.clone(),
        )
    }

    async fn seeded(store: &ContextStore, count: usize, tokens_each: u32) -> String {
        let ctx = store
            .create(ContextType::Primary, Some("release planning".into()))
            .await;
        for i in 0..count {
            store
                .append_with_tokens(
                    &ctx.id,
                    MessageRole::User,
                    &format!("release checklist item {i}"),
                    tokens_each,
                )
                .await
                .unwrap();
        }
        ctx.id
    }

    #[tokio::test]
    async fn test_skips_under_threshold() {
        let f = fixture();
        let id = seeded(&f.store, 35, 100).await;
        let outcome = compactor(&f, Arc::new(MockGenerationService::new()))
            .compact(&id)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            CompactionOutcome::Skipped {
                decision: BudgetDecision::WithinBudget { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_compacts_oldest_and_keeps_recent() {
        let f = fixture();
        let id = seeded(&f.store, 35, 2_143).await;
        let before = f.store.context_state(&id).await.unwrap();
        assert!(before.context_utilization >= 75.0);

        let bus = EventBus::new().shared();
        let mut rx = bus.subscribe();
        let outcome = compactor(&f, Arc::new(MockGenerationService::new()))
            .with_events(bus)
            .compact(&id)
            .await
            .unwrap();

        let CompactionOutcome::Compacted { snapshot, state } = outcome else {
            panic!("expected compaction");
        };
        assert_eq!(snapshot.message_count(), 15);
        assert!(snapshot.compressed_tokens() < snapshot.token_count());
        assert_eq!(state.active_message_count, 20);
        assert_eq!(state.snapshot_count, 1);
        assert!(state.context_utilization < before.context_utilization);

        let ctx = f.store.get(&id).await.unwrap();
        assert_eq!(ctx.messages[0].content, "release checklist item 15");
        assert_eq!(ctx.token_usage.total, 20 * 2_143);
        assert_eq!(f.persistence.snapshot_count(&id).await, 1);

        assert_eq!(rx.recv().await.unwrap().event_type(), "compaction_started");
        assert_eq!(rx.recv().await.unwrap().event_type(), "compaction_completed");
    }

    #[tokio::test]
    async fn test_summarizer_failure_leaves_context_untouched() {
        let f = fixture();
        let id = seeded(&f.store, 35, 2_143).await;
        let bus = EventBus::new().shared();
        let mut rx = bus.subscribe_filtered(crate::events::EventFilter::new().types(&["compaction_failed"]));

        let err = compactor(&f, Arc::new(MockGenerationService::failing()))
            .with_events(bus)
            .compact(&id)
            .await
            .unwrap_err();
        assert_eq!(err.kind, CompactionErrorKind::SummarizationFailed);
        assert!(err.is_retryable());

        let ctx = f.store.get(&id).await.unwrap();
        assert_eq!(ctx.messages.len(), 35);
        assert!(!f.store.is_compacting(&id).await.unwrap());
        assert_eq!(f.store.snapshots(&id).await.unwrap().len(), 0);
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_summary_is_a_failure() {
        let f = fixture();
        let id = seeded(&f.store, 35, 2_143).await;
        let err = compactor(&f, Arc::new(MockGenerationService::empty_summaries()))
            .compact(&id)
            .await
            .unwrap_err();
        assert_eq!(err.kind, CompactionErrorKind::SummarizationFailed);
        assert_eq!(f.store.get(&id).await.unwrap().messages.len(), 35);
    }

    #[tokio::test]
    async fn test_second_claim_rejected() {
        let f = fixture();
        let id = seeded(&f.store, 35, 2_143).await;
        let _claim = f.store.claim_compaction(&id, 20).await.unwrap();

        let err = compactor(&f, Arc::new(MockGenerationService::new()))
            .compact(&id)
            .await
            .unwrap_err();
        assert_eq!(err.kind, CompactionErrorKind::ConcurrentModification);
        // The foreign claim is left in place.
        assert!(f.store.is_compacting(&id).await.unwrap());
    }

    struct SlowGenerator;

    #[async_trait]
    impl GenerationService for SlowGenerator {
        async fn generate(&self, _: &str, _: &ModelConfig) -> Result<String, GenerationError> {
            Ok(String::new())
        }

        async fn summarize(&self, _: &SummaryRequest) -> Result<SummaryResponse, GenerationError> {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Ok(SummaryResponse {
                summary: "late".into(),
                key_points: vec![],
                entities: vec![],
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let f = fixture();
        let id = seeded(&f.store, 35, 2_143).await;
        let err = compactor(&f, Arc::new(SlowGenerator))
            .compact(&id)
            .await
            .unwrap_err();
        assert_eq!(err.kind, CompactionErrorKind::Timeout);
        assert_eq!(f.store.get(&id).await.unwrap().messages.len(), 35);
        assert!(!f.store.is_compacting(&id).await.unwrap());
    }

    struct BrokenPersistence;

    #[async_trait]
    impl PersistenceStore for BrokenPersistence {
        async fn load_context(
            &self,
            _: &str,
        ) -> Result<Option<crate::context::Context>, PersistenceError> {
            Ok(None)
        }
        async fn save_context(&self, _: &crate::context::Context) -> Result<(), PersistenceError> {
            Ok(())
        }
        async fn append_snapshot(&self, _: &MemorySnapshot) -> Result<(), PersistenceError> {
            Err(PersistenceError::Backend("disk full".into()))
        }
        async fn load_snapshots(&self, _: &str) -> Result<Vec<MemorySnapshot>, PersistenceError> {
            Ok(Vec::new())
        }
        async fn load_context_state(
            &self,
            _: &str,
        ) -> Result<Option<ContextState>, PersistenceError> {
            Ok(None)
        }
        async fn save_context_state(&self, _: &ContextState) -> Result<(), PersistenceError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_leaves_context_untouched() {
        let f = fixture();
        let id = seeded(&f.store, 35, 2_143).await;
        let compactor = ContextCompactor::new(
            CompactionSettings::default(),
            f.store.clone(),
            Arc::new(MockGenerationService::new()),
            Arc::new(BrokenPersistence),
            f.clock.clone(),
        );
        let err = compactor.compact(&id).await.unwrap_err();
        assert_eq!(err.kind, CompactionErrorKind::PersistenceFailed);
        assert_eq!(f.store.get(&id).await.unwrap().messages.len(), 35);
        assert!(!f.store.is_compacting(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_compact_now_needs_older_messages() {
        let f = fixture();
        let id = seeded(&f.store, 5, 10).await;
        let err = compactor(&f, Arc::new(MockGenerationService::new()))
            .compact_now(&id)
            .await
            .unwrap_err();
        assert_eq!(err.kind, CompactionErrorKind::EmptyInput);
        assert!(!f.store.is_compacting(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_context_is_unavailable() {
        let f = fixture();
        let err = compactor(&f, Arc::new(MockGenerationService::new()))
            .compact("ghost")
            .await
            .unwrap_err();
        assert_eq!(err.kind, CompactionErrorKind::ContextUnavailable);
    }
}

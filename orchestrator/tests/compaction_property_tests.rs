//! Compaction property tests: compaction invariants checked across varied
//! history lengths and token weights.
//!
//! Tests verify:
//! - Utilization strictly decreases and snapshot count strictly increases
//! - Snapshots are smaller than the history they replace
//! - The most recent messages are never compacted
//! - Consecutive snapshots cover contiguous, ordered ranges
//! - Failed compactions leave the context untouched and can be retried

use std::sync::Arc;

use context_orchestrator::collaborators::{GenerationService, InMemoryPersistence, MockGenerationService};
use context_orchestrator::memory::{
    CompactionErrorKind, CompactionOutcome, CompactionSettings, ContextCompactor,
};
use context_orchestrator::{ContextStore, ContextType, ManualClock, MessageRole, SharedClock};

const MAX_TOKENS: u64 = 100_000;

/// (message count, base tokens per message); every case lands over the 70% threshold.
const CASES: &[(usize, u32)] = &[(30, 2_400), (35, 2_143), (48, 1_500), (64, 1_200), (100, 800)];

struct Harness {
    store: Arc<ContextStore>,
    persistence: Arc<InMemoryPersistence>,
    clock: SharedClock,
}

impl Harness {
    fn new() -> Self {
        let clock: SharedClock = Arc::new(ManualClock::starting_now());
        Self {
            store: Arc::new(ContextStore::new(clock.clone(), MAX_TOKENS)),
            persistence: Arc::new(InMemoryPersistence::new()),
            clock,
        }
    }

    fn compactor(&self, generator: Arc<dyn GenerationService>) -> ContextCompactor {
        ContextCompactor::new(
            CompactionSettings::default(),
            self.store.clone(),
            generator,
            self.persistence.clone(),
            self.clock.clone(),
        )
    }

    /// Fill a context with `count` messages of slightly varying weight.
    async fn fill(&self, count: usize, base_tokens: u32) -> String {
        let ctx = self
            .store
            .create(ContextType::Primary, Some("quarterly roadmap".into()))
            .await;
        self.append(&ctx.id, 0, count, base_tokens).await;
        ctx.id
    }

    async fn append(&self, id: &str, start: usize, count: usize, base_tokens: u32) {
        let roles = [MessageRole::User, MessageRole::Assistant];
        for i in start..start + count {
            let tokens = base_tokens + (i as u32 % 5) * 10;
            self.store
                .append_with_tokens(
                    id,
                    roles[i % roles.len()],
                    &format!("roadmap item {i} needs review"),
                    tokens,
                )
                .await
                .unwrap();
        }
    }
}

#[tokio::test]
async fn test_utilization_decreases_and_snapshots_increase() {
    for &(count, base) in CASES {
        let h = Harness::new();
        let id = h.fill(count, base).await;
        let before = h.store.context_state(&id).await.unwrap();
        assert!(before.context_utilization >= 70.0, "case {count}x{base}");

        let outcome = h
            .compactor(Arc::new(MockGenerationService::new()))
            .compact(&id)
            .await
            .unwrap();
        let CompactionOutcome::Compacted { snapshot, state } = outcome else {
            panic!("case {count}x{base}: expected compaction");
        };

        assert!(state.context_utilization < before.context_utilization);
        assert_eq!(state.snapshot_count, before.snapshot_count + 1);
        assert!(snapshot.compressed_tokens() < snapshot.token_count());
        assert_eq!(snapshot.message_count(), count - 20);
        assert_eq!(state.active_message_count, 20);
        assert_eq!(
            before.total_tokens - state.total_tokens,
            snapshot.token_count(),
            "compacted weight must move into the snapshot"
        );
        assert!(state.last_snapshot_at.is_some());
    }
}

#[tokio::test]
async fn test_recent_window_is_never_compacted() {
    for &(count, base) in CASES {
        let h = Harness::new();
        let id = h.fill(count, base).await;
        let original = h.store.get(&id).await.unwrap().messages;

        h.compactor(Arc::new(MockGenerationService::new()))
            .compact(&id)
            .await
            .unwrap();

        let kept: Vec<String> = h
            .store
            .get(&id)
            .await
            .unwrap()
            .messages
            .into_iter()
            .map(|m| m.id)
            .collect();
        let expected: Vec<String> = original[count - 20..].iter().map(|m| m.id.clone()).collect();
        assert_eq!(kept, expected, "case {count}x{base}");
    }
}

#[tokio::test]
async fn test_consecutive_snapshots_are_contiguous() {
    let h = Harness::new();
    let id = h.fill(35, 2_143).await;
    let original = h.store.get(&id).await.unwrap().messages;
    let compactor = h.compactor(Arc::new(MockGenerationService::new()));

    compactor.compact(&id).await.unwrap();
    // 20 kept + 40 new: 60 active, back over 70%
    h.append(&id, 35, 40, 700).await;
    let outcome = compactor.compact(&id).await.unwrap();
    assert!(matches!(outcome, CompactionOutcome::Compacted { .. }));

    let snapshots = h.store.snapshots(&id).await.unwrap();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].first_message_id(), original[0].id);
    assert_eq!(snapshots[0].last_message_id(), original[14].id);
    assert_eq!(snapshots[1].first_message_id(), original[15].id);
    assert!(snapshots[1].first_message_at() >= snapshots[0].last_message_at());
    assert_eq!(snapshots[1].message_count(), 40);

    let state = h.store.context_state(&id).await.unwrap();
    assert_eq!(state.snapshot_count, 2);
    assert_eq!(state.active_message_count, 20);
    assert_eq!(h.persistence.snapshot_count(&id).await, 2);
}

#[tokio::test]
async fn test_failed_compaction_is_retryable_without_mutation() {
    let failing: [Arc<dyn GenerationService>; 2] = [
        Arc::new(MockGenerationService::failing()),
        Arc::new(MockGenerationService::empty_summaries()),
    ];

    for generator in failing {
        let h = Harness::new();
        let id = h.fill(35, 2_143).await;
        let before = h.store.get(&id).await.unwrap();

        let err = h.compactor(generator).compact(&id).await.unwrap_err();
        assert!(err.is_retryable(), "{err}");

        let after = h.store.get(&id).await.unwrap();
        assert_eq!(after.messages, before.messages);
        assert_eq!(after.token_usage.total, before.token_usage.total);
        assert!(!h.store.is_compacting(&id).await.unwrap());
        assert_eq!(h.store.context_state(&id).await.unwrap().snapshot_count, 0);

        // next evaluation succeeds
        let outcome = h
            .compactor(Arc::new(MockGenerationService::new()))
            .compact(&id)
            .await
            .unwrap();
        assert!(matches!(outcome, CompactionOutcome::Compacted { .. }));
    }
}

#[tokio::test]
async fn test_short_history_cannot_be_forced() {
    let h = Harness::new();
    let id = h.fill(20, 4_000).await;
    let err = h
        .compactor(Arc::new(MockGenerationService::new()))
        .compact_now(&id)
        .await
        .unwrap_err();
    assert_eq!(err.kind, CompactionErrorKind::EmptyInput);
    assert_eq!(h.store.get(&id).await.unwrap().messages.len(), 20);
}

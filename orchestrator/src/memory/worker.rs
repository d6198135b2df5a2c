//! Background compaction worker.
//!
//! Requests are queued on an unbounded mpsc channel and drained by a single
//! Tokio task. Requests that pile up while a compaction runs are coalesced
//! per context id. Outcomes are announced on the compactor's event bus.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::compactor::{CompactionOutcome, ContextCompactor};
use crate::events::{EventBus, OrchestratorEvent};

/// Counters for worker activity.
#[derive(Debug, Default)]
pub struct WorkerStats {
    requested: AtomicU64,
    coalesced: AtomicU64,
    compacted: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`WorkerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStatsSnapshot {
    pub requested: u64,
    pub coalesced: u64,
    pub compacted: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            requested: self.requested.load(Ordering::SeqCst),
            coalesced: self.coalesced.load(Ordering::SeqCst),
            compacted: self.compacted.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

/// Spawns the worker task.
pub struct CompactionWorker;

impl CompactionWorker {
    /// Start a worker. A private event bus is attached when the compactor
    /// has none, so [`CompactionHandle::subscribe`] always works.
    pub fn spawn(compactor: ContextCompactor) -> CompactionHandle {
        let compactor = if compactor.events().is_some() {
            compactor
        } else {
            compactor.with_events(EventBus::new().shared())
        };
        let compactor = Arc::new(compactor);
        let stats = Arc::new(WorkerStats::default());
        let (sender, receiver) = mpsc::unbounded_channel::<String>();

        let join = tokio::spawn(run(compactor.clone(), receiver, stats.clone()));
        info!("Compaction worker started");

        CompactionHandle {
            sender,
            compactor,
            stats,
            join,
        }
    }
}

async fn run(
    compactor: Arc<ContextCompactor>,
    mut receiver: mpsc::UnboundedReceiver<String>,
    stats: Arc<WorkerStats>,
) {
    while let Some(first) = receiver.recv().await {
        let mut batch = vec![first];
        while let Ok(next) = receiver.try_recv() {
            if batch.contains(&next) {
                stats.coalesced.fetch_add(1, Ordering::SeqCst);
            } else {
                batch.push(next);
            }
        }

        for context_id in batch {
            match compactor.compact(&context_id).await {
                Ok(CompactionOutcome::Compacted { .. }) => {
                    stats.compacted.fetch_add(1, Ordering::SeqCst);
                }
                Ok(CompactionOutcome::Skipped { decision, .. }) => {
                    stats.skipped.fetch_add(1, Ordering::SeqCst);
                    debug!(context_id = %context_id, decision = %decision, "Worker skipped compaction");
                }
                Err(err) => {
                    stats.failed.fetch_add(1, Ordering::SeqCst);
                    debug!(context_id = %context_id, kind = %err.kind, "Worker compaction failed");
                }
            }
        }
    }
    info!("Compaction worker stopped");
}

/// Handle to a running compaction worker.
pub struct CompactionHandle {
    sender: mpsc::UnboundedSender<String>,
    compactor: Arc<ContextCompactor>,
    stats: Arc<WorkerStats>,
    join: JoinHandle<()>,
}

impl CompactionHandle {
    /// Queue a compaction check. Returns false once the worker has stopped.
    pub fn request(&self, context_id: &str) -> bool {
        let queued = self.sender.send(context_id.to_string()).is_ok();
        if queued {
            self.stats.requested.fetch_add(1, Ordering::SeqCst);
        }
        queued
    }

    /// Compaction events (started, completed, failed).
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        match self.compactor.events() {
            Some(bus) => bus.subscribe(),
            // spawn always attaches a bus
            None => EventBus::new().subscribe(),
        }
    }

    pub fn compactor(&self) -> &Arc<ContextCompactor> {
        &self.compactor
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop accepting requests and wait for queued work to drain.
    pub async fn shutdown(self) {
        drop(self.sender);
        if let Err(e) = self.join.await {
            debug!(error = %e, "Compaction worker join failed");
        }
    }
}

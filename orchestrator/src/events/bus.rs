//! Event bus for orchestration notifications
//!
//! Pub/sub over a Tokio broadcast channel. Publishing with no subscribers is
//! not an error; slow subscribers may observe `Lagged`.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::OrchestratorEvent;

/// Default broadcast buffer per subscriber.
const CHANNEL_CAPACITY: usize = 256;

pub type SharedEventBus = Arc<EventBus>;

/// Broadcast fan-out of [`OrchestratorEvent`]s.
pub struct EventBus {
    sender: broadcast::Sender<OrchestratorEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    /// `capacity` is clamped to at least one.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Returns the number of receivers the event reached.
    pub fn publish(&self, event: OrchestratorEvent) -> usize {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => {
                debug!(event_type, receivers = count, "Event published");
                count
            }
            Err(_) => {
                debug!(event_type, "Event published (no receivers)");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.sender.subscribe()
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Selects events for a [`FilteredReceiver`]. The empty filter passes everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    context_id: Option<String>,
    /// Empty means any type.
    event_types: BTreeSet<&'static str>,
    compaction_outcomes: bool,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only events about `context_id`. Global events never match.
    pub fn context(mut self, context_id: &str) -> Self {
        self.context_id = Some(context_id.to_string());
        self
    }

    /// Only the given `event_type()` names.
    pub fn types(mut self, event_types: &[&'static str]) -> Self {
        self.event_types.extend(event_types.iter().copied());
        self
    }

    /// Only compaction completed/failed events.
    pub fn compaction_outcomes(mut self) -> Self {
        self.compaction_outcomes = true;
        self
    }

    pub fn matches(&self, event: &OrchestratorEvent) -> bool {
        let context_ok = self
            .context_id
            .as_deref()
            .map_or(true, |id| event.context_id() == Some(id));
        let type_ok =
            self.event_types.is_empty() || self.event_types.contains(event.event_type());
        let outcome_ok = !self.compaction_outcomes || event.is_compaction_outcome();
        context_ok && type_ok && outcome_ok
    }
}

/// Receiver that skips events the filter rejects.
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<OrchestratorEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<OrchestratorEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Next matching event. Lag and close errors pass through unchanged.
    pub async fn recv(&mut self) -> Result<OrchestratorEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextType;
    use chrono::Utc;

    fn created(id: &str) -> OrchestratorEvent {
        OrchestratorEvent::ContextCreated {
            context_id: id.to_string(),
            context_type: ContextType::Primary,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        assert_eq!(bus.publish(created("ctx-1")), 1);

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.event_type(), "context_created");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert!(!bus.has_subscribers());
        assert_eq!(bus.publish(created("ctx-1")), 0);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new().shared();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);
        bus.publish(created("ctx-1"));

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1, e2);
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter::new()
            .context("ctx-1")
            .types(&["context_created"]);

        assert!(filter.matches(&created("ctx-1")));
        assert!(!filter.matches(&created("ctx-2")));
        assert!(!filter.matches(&OrchestratorEvent::CompactionStarted {
            context_id: "ctx-1".into(),
            message_count: 3,
            timestamp: Utc::now(),
        }));
    }

    #[test]
    fn test_compaction_outcome_filter() {
        let filter = EventFilter::new().compaction_outcomes();
        assert!(!filter.matches(&created("ctx-1")));
        assert!(filter.matches(&OrchestratorEvent::CompactionFailed {
            context_id: "ctx-1".into(),
            kind: crate::memory::CompactionErrorKind::Timeout,
            detail: "slow".into(),
            timestamp: Utc::now(),
        }));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let bus = EventBus::new().shared();
        let mut filtered = bus.subscribe_filtered(EventFilter::new().context("target"));

        let publisher = bus.clone();
        tokio::spawn(async move {
            publisher.publish(created("other"));
            publisher.publish(created("target"));
        });

        let event = filtered.recv().await.unwrap();
        assert_eq!(event.context_id(), Some("target"));
    }
}

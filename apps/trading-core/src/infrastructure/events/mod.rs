//! Event Publishing Adapters
//!
//! - `BroadcastEventPublisher`: tokio broadcast fan-out to any number of
//!   subscribers
//! - `RecordingEventPublisher`: keeps every event in memory for assertions

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{EventPublishError, EventPublisherPort};
use crate::domain::events::{DomainEvent, EventChannel};

/// Channel capacity for domain events.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ============================================================================
// Broadcast
// ============================================================================

/// Fan-out publisher. Publishing never blocks; a lagging subscriber loses
/// the oldest events.
#[derive(Debug, Clone)]
pub struct BroadcastEventPublisher {
    sender: broadcast::Sender<DomainEvent>,
}

impl Default for BroadcastEventPublisher {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}

impl BroadcastEventPublisher {
    /// Create a publisher with the given buffer size.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Spawn a subscriber that logs every event until `shutdown` fires.
    pub fn spawn_logger(&self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let mut events = self.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = events.recv() => match received {
                        Ok(event) => log_event(&event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Event logger lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    () = shutdown.cancelled() => break,
                }
            }
        })
    }
}

fn log_event(event: &DomainEvent) {
    let channel = event.channel();
    match serde_json::to_string(event) {
        Ok(payload) => tracing::info!(
            event_type = event.event_type(),
            channel = %channel,
            payload = %payload,
            "Event"
        ),
        Err(e) => tracing::warn!(
            event_type = event.event_type(),
            channel = %channel,
            error = %e,
            "Event could not be serialized"
        ),
    }
}

#[async_trait]
impl EventPublisherPort for BroadcastEventPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<(), EventPublishError> {
        // No subscribers is not an error; the event is simply unobserved.
        let _ = self.sender.send(event);
        Ok(())
    }
}

// ============================================================================
// Recording
// ============================================================================

/// Publisher that keeps every event, for tests and audits.
#[derive(Debug, Clone, Default)]
pub struct RecordingEventPublisher {
    events: Arc<RwLock<Vec<DomainEvent>>>,
}

impl RecordingEventPublisher {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event so far, in publish order.
    #[must_use]
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.read().clone()
    }

    /// Number of events of one type, e.g. `"ORDER_FILLED"`.
    #[must_use]
    pub fn count_of(&self, event_type: &str) -> usize {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }

    /// Events delivered to one channel.
    #[must_use]
    pub fn on_channel(&self, channel: &EventChannel) -> Vec<DomainEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| &e.channel() == channel)
            .cloned()
            .collect()
    }

    /// Forget everything recorded.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[async_trait]
impl EventPublisherPort for RecordingEventPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<(), EventPublishError> {
        self.events.write().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::NotificationSeverity;
    use crate::domain::shared::UserId;

    fn notification(user: &str) -> DomainEvent {
        DomainEvent::UserNotification {
            user_id: UserId::new(user),
            severity: NotificationSeverity::Warning,
            title: "Heads up".into(),
            message: "Something happened".into(),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let publisher = BroadcastEventPublisher::new(8);
        let mut first = publisher.subscribe();
        let mut second = publisher.subscribe();

        publisher.publish(notification("u-1")).await.unwrap();

        assert_eq!(first.recv().await.unwrap(), notification("u-1"));
        assert_eq!(second.recv().await.unwrap(), notification("u-1"));
        assert_eq!(publisher.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_is_ok() {
        let publisher = BroadcastEventPublisher::default();
        assert!(publisher.publish(notification("u-1")).await.is_ok());
    }

    #[tokio::test]
    async fn recorder_filters_by_type_and_channel() {
        let recorder = RecordingEventPublisher::new();
        recorder
            .publish_all(vec![notification("u-1"), notification("u-2")])
            .await
            .unwrap();

        assert_eq!(recorder.count_of("USER_NOTIFICATION"), 2);
        assert_eq!(recorder.count_of("ORDER_FILLED"), 0);
        assert_eq!(
            recorder
                .on_channel(&EventChannel::User(UserId::new("u-2")))
                .len(),
            1
        );

        recorder.clear();
        assert!(recorder.events().is_empty());
    }
}

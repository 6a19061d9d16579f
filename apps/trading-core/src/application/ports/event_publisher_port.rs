//! Event Publisher Port (Driven Port)
//!
//! Typed publish side of the notification sink.

use async_trait::async_trait;

use crate::domain::events::DomainEvent;

/// Event publishing error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventPublishError {
    /// Sink unavailable.
    #[error("event sink unavailable: {message}")]
    Unavailable {
        /// Details.
        message: String,
    },
}

/// Port for publishing domain events.
#[async_trait]
pub trait EventPublisherPort: Send + Sync {
    /// Publish one event.
    async fn publish(&self, event: DomainEvent) -> Result<(), EventPublishError>;

    /// Publish events in order, stopping at the first failure.
    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<(), EventPublishError> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

/// Publisher that drops everything.
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

#[async_trait]
impl EventPublisherPort for NoOpEventPublisher {
    async fn publish(&self, _event: DomainEvent) -> Result<(), EventPublishError> {
        Ok(())
    }
}

//! Connection Health Repository Port (Driven Port)

use async_trait::async_trait;

use crate::domain::connection_health::{HealthRecord, HealthTransition};
use crate::domain::shared::{ConnectionId, PersistenceError, Timestamp};

/// A persisted status change of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRecord {
    /// Connection.
    pub connection_id: ConnectionId,
    /// What happened.
    pub transition: HealthTransition,
    /// Error that caused it, for failures.
    pub error: Option<String>,
    /// When.
    pub at: Timestamp,
}

/// Durable store for connection health.
#[async_trait]
pub trait ConnectionHealthRepository: Send + Sync {
    /// Insert or replace the latest record.
    async fn save(&self, record: &HealthRecord) -> Result<(), PersistenceError>;

    /// Append a status change.
    async fn record_transition(&self, transition: TransitionRecord)
    -> Result<(), PersistenceError>;

    /// Status changes of one connection, oldest first.
    async fn transitions(
        &self,
        connection_id: &ConnectionId,
    ) -> Result<Vec<TransitionRecord>, PersistenceError>;
}

/// Liveness of broker connections as seen by order flow.
pub trait ConnectionStatusPort: Send + Sync {
    /// Whether the connection was deactivated and must not carry orders.
    fn is_deactivated(&self, connection_id: &ConnectionId) -> bool;
}

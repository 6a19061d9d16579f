//! Domain events published to observers.
//!
//! Every event is addressed to a user or a portfolio channel; fan-out and
//! transport belong to the subscriber.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::connection_health::ConnectionState;
use super::order_execution::{Fill, Order};
use super::portfolio::{PortfolioSnapshot, Position};
use super::shared::{ConnectionId, PortfolioId, UserId};

/// Where an event is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventChannel {
    /// Everything a user's clients should see.
    User(UserId),
    /// Portfolio views.
    Portfolio(PortfolioId),
}

impl fmt::Display for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Portfolio(id) => write!(f, "portfolio:{id}"),
        }
    }
}

/// Urgency of a user notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationSeverity {
    /// Informational.
    Info,
    /// Needs attention.
    Warning,
    /// Trading capability was lost.
    Critical,
}

/// All events the core produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainEvent {
    /// Broker acknowledged an order.
    OrderSubmitted {
        /// Order after submission.
        order: Order,
    },
    /// Broker refused an order.
    OrderRejected {
        /// Order after rejection.
        order: Order,
        /// Broker message.
        reason: String,
    },
    /// An execution was applied.
    OrderFilled {
        /// Order after the fill.
        order: Order,
        /// The execution.
        fill: Fill,
    },
    /// An order was cancelled.
    OrderCancelled {
        /// Order after cancellation.
        order: Order,
    },
    /// A fill changed a position.
    PositionUpdated {
        /// Position after the fill.
        position: Position,
    },
    /// Recomputed portfolio view.
    PortfolioSnapshot {
        /// The snapshot.
        snapshot: PortfolioSnapshot,
    },
    /// A connection's verdict flipped or it was deactivated.
    ConnectionHealthChanged {
        /// Connection.
        connection_id: ConnectionId,
        /// Owner.
        user_id: UserId,
        /// New verdict.
        healthy: bool,
        /// Lifecycle state.
        state: ConnectionState,
        /// Failure message, when unhealthy.
        error: Option<String>,
    },
    /// Message meant for a human.
    UserNotification {
        /// Recipient.
        user_id: UserId,
        /// Urgency.
        severity: NotificationSeverity,
        /// Short title.
        title: String,
        /// Body.
        message: String,
    },
    /// Bulk cancel of a user's open orders finished.
    EmergencyStop {
        /// User.
        user_id: UserId,
        /// Caller-supplied reason.
        reason: String,
        /// Orders cancelled.
        cancelled_count: usize,
        /// Orders whose cancel failed.
        failed_count: usize,
    },
}

impl DomainEvent {
    /// Delivery channel.
    #[must_use]
    pub fn channel(&self) -> EventChannel {
        match self {
            Self::OrderSubmitted { order }
            | Self::OrderRejected { order, .. }
            | Self::OrderFilled { order, .. }
            | Self::OrderCancelled { order } => EventChannel::User(order.user_id().clone()),
            Self::PositionUpdated { position } => {
                EventChannel::Portfolio(position.portfolio_id.clone())
            }
            Self::PortfolioSnapshot { snapshot } => {
                EventChannel::Portfolio(snapshot.portfolio_id.clone())
            }
            Self::ConnectionHealthChanged { user_id, .. }
            | Self::UserNotification { user_id, .. }
            | Self::EmergencyStop { user_id, .. } => EventChannel::User(user_id.clone()),
        }
    }

    /// Event type name.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::OrderSubmitted { .. } => "ORDER_SUBMITTED",
            Self::OrderRejected { .. } => "ORDER_REJECTED",
            Self::OrderFilled { .. } => "ORDER_FILLED",
            Self::OrderCancelled { .. } => "ORDER_CANCELLED",
            Self::PositionUpdated { .. } => "POSITION_UPDATED",
            Self::PortfolioSnapshot { .. } => "PORTFOLIO_SNAPSHOT",
            Self::ConnectionHealthChanged { .. } => "CONNECTION_HEALTH_CHANGED",
            Self::UserNotification { .. } => "USER_NOTIFICATION",
            Self::EmergencyStop { .. } => "EMERGENCY_STOP",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = DomainEvent::EmergencyStop {
            user_id: UserId::new("u-1"),
            reason: "panic button".to_string(),
            cancelled_count: 2,
            failed_count: 0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "EMERGENCY_STOP");
        assert_eq!(json["cancelled_count"], 2);
        assert_eq!(event.channel(), EventChannel::User(UserId::new("u-1")));
    }

    #[test]
    fn channel_display() {
        assert_eq!(
            EventChannel::Portfolio(PortfolioId::new("pf")).to_string(),
            "portfolio:pf"
        );
    }
}

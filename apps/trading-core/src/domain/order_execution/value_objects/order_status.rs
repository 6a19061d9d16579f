//! Order status in the lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an order.
///
/// ```text
/// Pending -> Submitted -> PartiallyFilled -> Filled
///    |           |               |
///    |           +-> Filled      +-> Cancelled
///    |           +-> Cancelled
///    |           +-> Rejected
///    +-> Rejected | Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Accepted by the engine, not yet acknowledged by the broker.
    Pending,
    /// Acknowledged by the broker, nothing executed yet.
    Submitted,
    /// Some but not all of the quantity has executed.
    PartiallyFilled,
    /// The whole quantity has executed.
    Filled,
    /// Cancelled before completing.
    Cancelled,
    /// Refused by the broker.
    Rejected,
}

impl OrderStatus {
    /// Filled, cancelled and rejected orders never change again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }

    /// Orders at the broker can receive executions.
    #[must_use]
    pub const fn can_fill(&self) -> bool {
        matches!(self, Self::Submitted | Self::PartiallyFilled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Submitted => write!(f, "SUBMITTED"),
            Self::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            Self::Filled => write!(f, "FILLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Submitted.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
    }

    #[test]
    fn only_working_orders_fill() {
        assert!(!OrderStatus::Pending.can_fill());
        assert!(OrderStatus::Submitted.can_fill());
        assert!(OrderStatus::PartiallyFilled.can_fill());
        assert!(!OrderStatus::Filled.can_fill());
    }
}

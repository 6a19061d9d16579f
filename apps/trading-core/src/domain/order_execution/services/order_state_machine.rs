//! Order State Machine Service
//!
//! The only legal status transitions of an order.

use crate::domain::order_execution::errors::OrderError;
use crate::domain::order_execution::value_objects::OrderStatus;

/// Validates order status transitions. Terminal statuses have no successors.
pub struct OrderStateMachine;

impl OrderStateMachine {
    /// Check if a transition is allowed.
    #[must_use]
    pub const fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
        matches!(
            (from, to),
            (
                OrderStatus::Pending,
                OrderStatus::Submitted | OrderStatus::Rejected | OrderStatus::Cancelled
            ) | (
                OrderStatus::Submitted,
                OrderStatus::PartiallyFilled
                    | OrderStatus::Filled
                    | OrderStatus::Cancelled
                    | OrderStatus::Rejected
            ) | (
                OrderStatus::PartiallyFilled,
                OrderStatus::PartiallyFilled | OrderStatus::Filled | OrderStatus::Cancelled
            )
        )
    }

    /// Validate a transition.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::InvalidStateTransition`] when the graph forbids it.
    pub fn validate_transition(from: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
        if Self::is_valid_transition(from, to) {
            Ok(())
        } else {
            Err(OrderError::InvalidStateTransition {
                from,
                to,
                reason: Self::transition_error_reason(from, to),
            })
        }
    }

    /// Reason text for a rejected transition.
    #[must_use]
    pub fn transition_error_reason(from: OrderStatus, to: OrderStatus) -> String {
        if from.is_terminal() {
            format!("order is already {from} and cannot become {to}")
        } else {
            format!("{from} cannot move to {to}")
        }
    }

    /// All statuses reachable in one step.
    #[must_use]
    pub fn valid_next_states(from: OrderStatus) -> Vec<OrderStatus> {
        [
            OrderStatus::Pending,
            OrderStatus::Submitted,
            OrderStatus::PartiallyFilled,
            OrderStatus::Filled,
            OrderStatus::Cancelled,
            OrderStatus::Rejected,
        ]
        .into_iter()
        .filter(|to| Self::is_valid_transition(from, *to))
        .collect()
    }
}

//! Order execution errors.

use thiserror::Error;

use super::value_objects::OrderStatus;
use crate::domain::shared::{OrderId, Quantity};

/// Errors raised by the order aggregate and its services.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The state graph does not allow this transition.
    #[error("invalid order state transition: {from} -> {to}: {reason}")]
    InvalidStateTransition {
        /// Current status.
        from: OrderStatus,
        /// Attempted status.
        to: OrderStatus,
        /// Human-readable reason.
        reason: String,
    },

    /// Executions are only accepted while the order is working at the broker.
    #[error("cannot fill order in status {status}")]
    CannotFill {
        /// Current status.
        status: OrderStatus,
    },

    /// Terminal orders cannot be cancelled.
    #[error("cannot cancel order in status {status}")]
    CannotCancel {
        /// Current status.
        status: OrderStatus,
    },

    /// Execution larger than the open quantity.
    #[error("fill quantity {fill_qty} exceeds remaining {remaining_qty}")]
    FillExceedsRemaining {
        /// Quantity of the rejected execution.
        fill_qty: Quantity,
        /// Quantity still open.
        remaining_qty: Quantity,
    },

    /// Execution does not belong to this order.
    #[error("fill for {fill_order} applied to order {order_id}")]
    FillMismatch {
        /// Order the fill was applied to.
        order_id: OrderId,
        /// Order the fill references.
        fill_order: OrderId,
    },

    /// Malformed request.
    #[error("invalid order parameter '{field}': {message}")]
    InvalidParameters {
        /// Offending field.
        field: String,
        /// What is wrong.
        message: String,
    },
}

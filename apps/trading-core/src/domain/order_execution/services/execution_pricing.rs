//! Execution price selection against a reference price.

use crate::domain::order_execution::aggregate::Order;
use crate::domain::order_execution::value_objects::{OrderSide, OrderType};
use crate::domain::shared::Money;

/// Decides whether an order is executable at the current reference price.
pub struct ExecutionPricing;

impl ExecutionPricing {
    /// Price the order executes at, or `None` when it does not trigger.
    ///
    /// Market orders take the reference price. Limit orders execute at the
    /// reference price once it is at or through the limit. Stop orders
    /// trigger once the reference price reaches the stop; stop-limit orders
    /// additionally need the limit condition.
    #[must_use]
    pub fn execution_price(order: &Order, reference: Money) -> Option<Money> {
        let executable = match order.order_type() {
            OrderType::Market => true,
            OrderType::Limit => Self::limit_crossed(order.side(), order.limit_price(), reference),
            OrderType::Stop => Self::stop_triggered(order.side(), order.stop_price(), reference),
            OrderType::StopLimit => {
                Self::stop_triggered(order.side(), order.stop_price(), reference)
                    && Self::limit_crossed(order.side(), order.limit_price(), reference)
            }
        };
        executable.then_some(reference)
    }

    fn limit_crossed(side: OrderSide, limit: Option<Money>, reference: Money) -> bool {
        match (side, limit) {
            (OrderSide::Buy, Some(limit)) => reference <= limit,
            (OrderSide::Sell, Some(limit)) => reference >= limit,
            (_, None) => false,
        }
    }

    fn stop_triggered(side: OrderSide, stop: Option<Money>, reference: Money) -> bool {
        match (side, stop) {
            (OrderSide::Buy, Some(stop)) => reference >= stop,
            (OrderSide::Sell, Some(stop)) => reference <= stop,
            (_, None) => false,
        }
    }
}

//! Broker Port (Driven Port)
//!
//! Interface to a brokerage connection: probing, account lookups,
//! order submission and cancellation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::Order;
use crate::domain::order_execution::value_objects::{OrderSide, OrderType, TimeInForce};
use crate::domain::shared::{BrokerOrderId, Money, OrderId, Quantity, Symbol};

/// Order as sent to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOrderRequest {
    /// Engine order id, echoed back in execution reports.
    pub client_order_id: OrderId,
    /// Instrument.
    pub symbol: Symbol,
    /// Side.
    pub side: OrderSide,
    /// Kind.
    pub order_type: OrderType,
    /// Quantity.
    pub quantity: Quantity,
    /// Limit price.
    pub limit_price: Option<Money>,
    /// Stop price.
    pub stop_price: Option<Money>,
    /// Time in force.
    pub time_in_force: TimeInForce,
}

impl From<&Order> for SubmitOrderRequest {
    fn from(order: &Order) -> Self {
        Self {
            client_order_id: order.id().clone(),
            symbol: order.symbol().clone(),
            side: order.side(),
            order_type: order.order_type(),
            quantity: order.quantity(),
            limit_price: order.limit_price(),
            stop_price: order.stop_price(),
            time_in_force: order.time_in_force(),
        }
    }
}

/// Account balances reported by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalances {
    /// Broker account identifier.
    pub account_id: String,
    /// Settled cash.
    pub cash: Money,
    /// Buying power.
    pub buying_power: Money,
    /// Total equity.
    pub equity: Money,
}

/// Broker port error. Each kind is handled differently upstream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// Credentials refused.
    #[error("broker authentication failed: {message}")]
    Authentication {
        /// Broker message.
        message: String,
    },

    /// Too many requests.
    #[error("rate limited by broker")]
    RateLimited {
        /// Suggested wait, when the broker sent one.
        retry_after_secs: Option<u64>,
    },

    /// Broker unreachable.
    #[error("broker connectivity error: {message}")]
    Connectivity {
        /// Transport message.
        message: String,
    },

    /// Call did not complete in time.
    #[error("broker call timed out after {after_ms}ms")]
    Timeout {
        /// Elapsed budget.
        after_ms: u64,
    },

    /// Order refused.
    #[error("order rejected by broker: {reason}")]
    Rejected {
        /// Broker reason.
        reason: String,
    },

    /// Unknown broker order.
    #[error("broker order not found: {order_id}")]
    NotFound {
        /// The missing id.
        order_id: String,
    },
}

impl BrokerError {
    /// Whether a later attempt could succeed without user action.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Connectivity { .. } | Self::Timeout { .. }
        )
    }
}

/// Port for broker interactions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerPort: Send + Sync {
    /// Round-trip probe of the connection.
    async fn test_connection(&self) -> Result<(), BrokerError>;

    /// Current account balances.
    async fn get_account(&self) -> Result<AccountBalances, BrokerError>;

    /// Submit an order, returning the broker's id for it.
    async fn submit_order(&self, request: SubmitOrderRequest)
    -> Result<BrokerOrderId, BrokerError>;

    /// Cancel a working order.
    async fn cancel_order(&self, broker_order_id: &BrokerOrderId) -> Result<(), BrokerError>;
}

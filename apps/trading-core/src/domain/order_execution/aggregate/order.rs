//! Order Aggregate Root
//!
//! Owns an order's lifecycle, its fills and the running VWAP.

use serde::{Deserialize, Serialize};

use crate::domain::order_execution::errors::OrderError;
use crate::domain::order_execution::services::OrderStateMachine;
use crate::domain::order_execution::value_objects::{
    Fill, OrderRequest, OrderSide, OrderStatus, OrderType, TimeInForce,
};
use crate::domain::shared::{
    BrokerOrderId, Money, OrderId, PortfolioId, Quantity, Symbol, Timestamp, UserId,
};

/// Order Aggregate Root.
///
/// Invariants: `filled_quantity <= quantity`, the sum of fill quantities
/// equals `filled_quantity`, `avg_fill_price` is the VWAP of all fills, and
/// status only moves along [`OrderStateMachine`] edges.
#[allow(clippy::struct_field_names)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    portfolio_id: PortfolioId,
    symbol: Symbol,
    side: OrderSide,
    order_type: OrderType,
    quantity: Quantity,
    limit_price: Option<Money>,
    stop_price: Option<Money>,
    time_in_force: TimeInForce,
    status: OrderStatus,
    filled_quantity: Quantity,
    avg_fill_price: Money,
    broker_order_id: Option<BrokerOrderId>,
    fees: Money,
    commission: Money,
    fills: Vec<Fill>,
    status_reason: Option<String>,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl Order {
    /// Create a `Pending` order from a validated request.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::InvalidParameters`] if the request is malformed.
    pub fn new(request: OrderRequest) -> Result<Self, OrderError> {
        request.validate()?;
        let now = Timestamp::now();

        Ok(Self {
            id: OrderId::generate(),
            user_id: request.user_id,
            portfolio_id: request.portfolio_id,
            symbol: request.symbol,
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity,
            limit_price: request.limit_price,
            stop_price: request.stop_price,
            time_in_force: request.time_in_force,
            status: OrderStatus::Pending,
            filled_quantity: Quantity::ZERO,
            avg_fill_price: Money::ZERO,
            broker_order_id: None,
            fees: Money::ZERO,
            commission: Money::ZERO,
            fills: Vec::new(),
            status_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Order identifier.
    #[must_use]
    pub const fn id(&self) -> &OrderId {
        &self.id
    }

    /// Owner.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Portfolio the order trades for.
    #[must_use]
    pub const fn portfolio_id(&self) -> &PortfolioId {
        &self.portfolio_id
    }

    /// Instrument.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Side.
    #[must_use]
    pub const fn side(&self) -> OrderSide {
        self.side
    }

    /// Order kind.
    #[must_use]
    pub const fn order_type(&self) -> OrderType {
        self.order_type
    }

    /// Requested quantity.
    #[must_use]
    pub const fn quantity(&self) -> Quantity {
        self.quantity
    }

    /// Limit price.
    #[must_use]
    pub const fn limit_price(&self) -> Option<Money> {
        self.limit_price
    }

    /// Stop price.
    #[must_use]
    pub const fn stop_price(&self) -> Option<Money> {
        self.stop_price
    }

    /// Time in force.
    #[must_use]
    pub const fn time_in_force(&self) -> TimeInForce {
        self.time_in_force
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        self.status
    }

    /// Executed quantity so far.
    #[must_use]
    pub const fn filled_quantity(&self) -> Quantity {
        self.filled_quantity
    }

    /// Quantity still open.
    #[must_use]
    pub fn leaves_quantity(&self) -> Quantity {
        self.quantity - self.filled_quantity
    }

    /// Volume-weighted average execution price, zero before the first fill.
    #[must_use]
    pub const fn avg_fill_price(&self) -> Money {
        self.avg_fill_price
    }

    /// Broker-assigned identifier once submitted.
    #[must_use]
    pub const fn broker_order_id(&self) -> Option<&BrokerOrderId> {
        self.broker_order_id.as_ref()
    }

    /// Accrued regulatory fees.
    #[must_use]
    pub const fn fees(&self) -> Money {
        self.fees
    }

    /// Accrued commission.
    #[must_use]
    pub const fn commission(&self) -> Money {
        self.commission
    }

    /// Fills in execution order.
    #[must_use]
    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    /// Why the order was rejected or cancelled.
    #[must_use]
    pub fn status_reason(&self) -> Option<&str> {
        self.status_reason.as_deref()
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Last modification time.
    #[must_use]
    pub const fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// True once filled, cancelled or rejected.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Notional at a given price for the open quantity.
    #[must_use]
    pub fn open_notional(&self, price: Money) -> Money {
        price * self.leaves_quantity()
    }

    // ========================================================================
    // State Transitions
    // ========================================================================

    /// Record broker acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::InvalidStateTransition`] unless `Pending`.
    pub fn mark_submitted(&mut self, broker_id: BrokerOrderId) -> Result<(), OrderError> {
        self.transition(OrderStatus::Submitted)?;
        self.broker_order_id = Some(broker_id);
        Ok(())
    }

    /// Mark the order rejected.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::InvalidStateTransition`] once executions exist
    /// or the order is terminal.
    pub fn reject(&mut self, reason: impl Into<String>) -> Result<(), OrderError> {
        self.transition(OrderStatus::Rejected)?;
        self.status_reason = Some(reason.into());
        Ok(())
    }

    /// Cancel the open remainder. Fills already applied stay.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::CannotCancel`] for terminal orders.
    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), OrderError> {
        if self.status.is_terminal() {
            return Err(OrderError::CannotCancel {
                status: self.status,
            });
        }
        self.transition(OrderStatus::Cancelled)?;
        self.status_reason = Some(reason.into());
        Ok(())
    }

    /// Apply one execution: update filled quantity, VWAP, cost accruals and
    /// status in a single step. Nothing changes when an error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::CannotFill`] unless the order is working,
    /// [`OrderError::FillMismatch`] for a fill of another order, and
    /// [`OrderError::FillExceedsRemaining`] for an over-fill or a
    /// non-positive quantity.
    pub fn apply_fill(&mut self, fill: Fill) -> Result<OrderStatus, OrderError> {
        if !self.status.can_fill() {
            return Err(OrderError::CannotFill {
                status: self.status,
            });
        }
        if fill.order_id != self.id {
            return Err(OrderError::FillMismatch {
                order_id: self.id.clone(),
                fill_order: fill.order_id,
            });
        }
        let leaves = self.leaves_quantity();
        if !fill.quantity.is_positive() || fill.quantity > leaves {
            return Err(OrderError::FillExceedsRemaining {
                fill_qty: fill.quantity,
                remaining_qty: leaves,
            });
        }

        let new_filled = self.filled_quantity + fill.quantity;
        let next = if new_filled == self.quantity {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        OrderStateMachine::validate_transition(self.status, next)?;

        // VWAP: (old_avg * old_qty + px * qty) / new_qty
        let weighted = self.avg_fill_price * self.filled_quantity + fill.notional();
        self.avg_fill_price = weighted / new_filled.amount();
        self.filled_quantity = new_filled;
        self.fees += fill.fees;
        self.commission += fill.commission;
        self.fills.push(fill);
        self.status = next;
        self.updated_at = Timestamp::now();

        Ok(next)
    }

    fn transition(&mut self, to: OrderStatus) -> Result<(), OrderError> {
        OrderStateMachine::validate_transition(self.status, to)?;
        self.status = to;
        self.updated_at = Timestamp::now();
        Ok(())
    }
}

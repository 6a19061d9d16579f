//! Immutable execution record.

use serde::{Deserialize, Serialize};

use super::OrderSide;
use crate::domain::shared::{FillId, Money, OrderId, Quantity, Symbol, Timestamp};

/// One execution against an order. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    /// Fill identifier.
    pub id: FillId,
    /// Parent order.
    pub order_id: OrderId,
    /// Instrument.
    pub symbol: Symbol,
    /// Side of the parent order.
    pub side: OrderSide,
    /// Executed quantity.
    pub quantity: Quantity,
    /// Execution price.
    pub price: Money,
    /// Regulatory and exchange fees.
    pub fees: Money,
    /// Broker commission.
    pub commission: Money,
    /// Trade identifier from the broker, when it sent one.
    pub broker_trade_id: Option<String>,
    /// Execution time.
    pub executed_at: Timestamp,
}

impl Fill {
    /// `price * quantity`.
    #[must_use]
    pub fn notional(&self) -> Money {
        self.price * self.quantity
    }

    /// Effect on the cash ledger.
    ///
    /// Buys pay notional plus costs; sells receive notional less costs.
    #[must_use]
    pub fn cash_delta(&self) -> Money {
        let costs = self.fees + self.commission;
        match self.side {
            OrderSide::Buy => -(self.notional() + costs),
            OrderSide::Sell => self.notional() - costs,
        }
    }
}

//! Inbound order request.

use serde::{Deserialize, Serialize};

use super::{OrderSide, OrderType, TimeInForce};
use crate::domain::order_execution::errors::OrderError;
use crate::domain::shared::{Money, PortfolioId, Quantity, Symbol, UserId};

/// Everything a caller supplies to place an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Owner.
    pub user_id: UserId,
    /// Portfolio the resulting position belongs to.
    pub portfolio_id: PortfolioId,
    /// Instrument.
    pub symbol: Symbol,
    /// Buy or sell.
    pub side: OrderSide,
    /// Market, limit, stop or stop-limit.
    pub order_type: OrderType,
    /// Requested quantity.
    pub quantity: Quantity,
    /// Limit price for limit and stop-limit orders.
    pub limit_price: Option<Money>,
    /// Trigger price for stop and stop-limit orders.
    pub stop_price: Option<Money>,
    /// Time in force.
    #[serde(default)]
    pub time_in_force: TimeInForce,
}

impl OrderRequest {
    /// Market order with DAY time in force.
    #[must_use]
    pub fn market(
        user_id: UserId,
        portfolio_id: PortfolioId,
        symbol: impl Into<Symbol>,
        side: OrderSide,
        quantity: Quantity,
    ) -> Self {
        Self {
            user_id,
            portfolio_id,
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            limit_price: None,
            stop_price: None,
            time_in_force: TimeInForce::Day,
        }
    }

    /// Limit order with DAY time in force.
    #[must_use]
    pub fn limit(
        user_id: UserId,
        portfolio_id: PortfolioId,
        symbol: impl Into<Symbol>,
        side: OrderSide,
        quantity: Quantity,
        limit_price: Money,
    ) -> Self {
        Self {
            order_type: OrderType::Limit,
            limit_price: Some(limit_price),
            ..Self::market(user_id, portfolio_id, symbol, side, quantity)
        }
    }

    /// Replace the time in force.
    #[must_use]
    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    /// Set a stop price.
    #[must_use]
    pub fn with_stop_price(mut self, stop: Money) -> Self {
        self.stop_price = Some(stop);
        self
    }

    /// Check the request is well-formed.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::InvalidParameters`] for a bad symbol, a
    /// non-positive quantity, or a missing or non-positive price the order
    /// kind requires.
    pub fn validate(&self) -> Result<(), OrderError> {
        self.symbol
            .validate()
            .map_err(|e| OrderError::InvalidParameters {
                field: "symbol".to_string(),
                message: e.to_string(),
            })?;

        self.quantity
            .validate_for_order()
            .map_err(|e| OrderError::InvalidParameters {
                field: "quantity".to_string(),
                message: e.to_string(),
            })?;

        if self.order_type.requires_limit_price() && self.limit_price.is_none() {
            return Err(OrderError::InvalidParameters {
                field: "limit_price".to_string(),
                message: format!("{} orders require a limit price", self.order_type),
            });
        }

        if self.order_type.requires_stop_price() && self.stop_price.is_none() {
            return Err(OrderError::InvalidParameters {
                field: "stop_price".to_string(),
                message: format!("{} orders require a stop price", self.order_type),
            });
        }

        for (field, price) in [("limit_price", self.limit_price), ("stop_price", self.stop_price)] {
            match price {
                Some(price) if !price.is_positive() => {
                    return Err(OrderError::InvalidParameters {
                        field: field.to_string(),
                        message: format!("price must be positive, got {price}"),
                    });
                }
                _ => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(qty: i64) -> OrderRequest {
        OrderRequest::market(
            UserId::new("u-1"),
            PortfolioId::new("p-1"),
            "AAPL",
            OrderSide::Buy,
            Quantity::from_i64(qty),
        )
    }

    #[test]
    fn rejects_non_positive_quantity() {
        assert!(matches!(
            market(0).validate(),
            Err(OrderError::InvalidParameters { field, .. }) if field == "quantity"
        ));
    }

    #[test]
    fn limit_requires_price() {
        let mut req = market(10);
        req.order_type = OrderType::Limit;
        assert!(matches!(
            req.validate(),
            Err(OrderError::InvalidParameters { field, .. }) if field == "limit_price"
        ));
    }

    #[test]
    fn stop_limit_requires_stop_price() {
        let mut req = market(10);
        req.order_type = OrderType::StopLimit;
        req.limit_price = Some(Money::from_i64(10));
        assert!(matches!(
            req.validate(),
            Err(OrderError::InvalidParameters { field, .. }) if field == "stop_price"
        ));
    }

    #[test]
    fn accepts_well_formed_stop() {
        let mut req = market(10).with_stop_price(Money::from_i64(95));
        req.order_type = OrderType::Stop;
        assert!(req.validate().is_ok());
    }
}

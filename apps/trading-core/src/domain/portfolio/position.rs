//! Position entity.

use rust_decimal::Decimal;
use rust_decimal::prelude::Signed;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::value_objects::OrderSide;
use crate::domain::shared::{Money, PortfolioId, Quantity, Symbol, Timestamp, UserId};

/// Net holding of one symbol in one portfolio.
///
/// Positive quantity is long, negative short. A flat position keeps its
/// realized P&L but has a zero average price and zero market value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Owner.
    pub user_id: UserId,
    /// Portfolio.
    pub portfolio_id: PortfolioId,
    /// Instrument.
    pub symbol: Symbol,
    /// Signed quantity.
    pub quantity: Quantity,
    /// Average entry price of the open quantity.
    pub average_price: Money,
    /// Realized P&L accumulated over the position's life.
    pub realized_pnl: Money,
    /// Latest reference price seen.
    pub last_price: Money,
    /// Last modification.
    pub updated_at: Timestamp,
}

impl Position {
    /// A flat position.
    #[must_use]
    pub fn new(user_id: UserId, portfolio_id: PortfolioId, symbol: Symbol) -> Self {
        Self {
            user_id,
            portfolio_id,
            symbol,
            quantity: Quantity::ZERO,
            average_price: Money::ZERO,
            realized_pnl: Money::ZERO,
            last_price: Money::ZERO,
            updated_at: Timestamp::now(),
        }
    }

    /// True when no shares are held.
    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    /// Net a fill into the position and return the P&L it realized.
    ///
    /// Adding to a position re-weights the average price. Reducing realizes
    /// `(price - avg)` per closed share for longs and `(avg - price)` for
    /// shorts. Crossing zero closes the old side and opens the remainder at
    /// the fill price.
    pub fn apply_fill(&mut self, side: OrderSide, quantity: Quantity, price: Money) -> Money {
        let current = self.quantity.amount();
        let delta = quantity.amount().abs() * side.sign();
        let mut realized = Money::ZERO;

        let reducing = (current > Decimal::ZERO && delta < Decimal::ZERO)
            || (current < Decimal::ZERO && delta > Decimal::ZERO);
        if reducing {
            let closed = delta.abs().min(current.abs());
            realized = if current > Decimal::ZERO {
                (price - self.average_price) * closed
            } else {
                (self.average_price - price) * closed
            };
        }

        let next = current + delta;
        if next.is_zero() {
            self.average_price = Money::ZERO;
        } else if !reducing {
            let cost = self.average_price * current.abs() + price * delta.abs();
            self.average_price = cost / next.abs();
        } else if next.signum() != current.signum() {
            self.average_price = price;
        }

        self.quantity = Quantity::new(next);
        self.realized_pnl += realized;
        self.last_price = price;
        self.updated_at = Timestamp::now();
        realized
    }

    /// Record a new reference price.
    pub fn mark(&mut self, price: Money) {
        self.last_price = price;
        self.updated_at = Timestamp::now();
    }

    /// Signed market value at the last price.
    #[must_use]
    pub fn market_value(&self) -> Money {
        if self.is_flat() {
            return Money::ZERO;
        }
        self.last_price * self.quantity
    }

    /// Average price times absolute quantity.
    #[must_use]
    pub fn cost_basis(&self) -> Money {
        self.average_price * self.quantity.abs()
    }

    /// `(last - avg) * quantity`.
    #[must_use]
    pub fn unrealized_pnl(&self) -> Money {
        if self.is_flat() {
            return Money::ZERO;
        }
        (self.last_price - self.average_price) * self.quantity
    }

    /// Unrealized P&L as a percentage of cost basis.
    #[must_use]
    pub fn unrealized_pnl_percent(&self) -> Decimal {
        self.unrealized_pnl().ratio_to(self.cost_basis()) * Decimal::ONE_HUNDRED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position() -> Position {
        Position::new(UserId::new("u"), PortfolioId::new("p"), Symbol::new("AAPL"))
    }

    #[test]
    fn buy_then_partial_sell_realizes_gain() {
        let mut pos = position();
        assert_eq!(
            pos.apply_fill(OrderSide::Buy, Quantity::from_i64(10), Money::from_i64(100)),
            Money::ZERO
        );
        let realized = pos.apply_fill(OrderSide::Sell, Quantity::from_i64(4), Money::from_i64(110));

        assert_eq!(realized, Money::from_i64(40));
        assert_eq!(pos.quantity, Quantity::from_i64(6));
        assert_eq!(pos.average_price, Money::from_i64(100));
    }

    #[test]
    fn adding_reweights_average() {
        let mut pos = position();
        pos.apply_fill(OrderSide::Buy, Quantity::from_i64(10), Money::from_i64(100));
        pos.apply_fill(OrderSide::Buy, Quantity::from_i64(30), Money::from_i64(120));
        assert_eq!(pos.average_price, Money::from_i64(115));
    }

    #[test]
    fn closing_resets_average_and_market_value() {
        let mut pos = position();
        pos.apply_fill(OrderSide::Buy, Quantity::from_i64(5), Money::from_i64(50));
        pos.apply_fill(OrderSide::Sell, Quantity::from_i64(5), Money::from_i64(45));

        assert!(pos.is_flat());
        assert_eq!(pos.average_price, Money::ZERO);
        assert_eq!(pos.market_value(), Money::ZERO);
        assert_eq!(pos.realized_pnl, Money::from_i64(-25));
    }

    #[test]
    fn short_realizes_on_cover() {
        let mut pos = position();
        pos.apply_fill(OrderSide::Sell, Quantity::from_i64(10), Money::from_i64(100));
        let realized = pos.apply_fill(OrderSide::Buy, Quantity::from_i64(10), Money::from_i64(90));
        assert_eq!(realized, Money::from_i64(100));
    }

    #[test]
    fn flipping_opens_at_fill_price() {
        let mut pos = position();
        pos.apply_fill(OrderSide::Buy, Quantity::from_i64(5), Money::from_i64(100));
        let realized = pos.apply_fill(OrderSide::Sell, Quantity::from_i64(8), Money::from_i64(104));

        assert_eq!(realized, Money::from_i64(20));
        assert_eq!(pos.quantity, Quantity::from_i64(-3));
        assert_eq!(pos.average_price, Money::from_i64(104));
    }

    #[test]
    fn unrealized_follows_mark() {
        let mut pos = position();
        pos.apply_fill(OrderSide::Buy, Quantity::from_i64(10), Money::from_i64(100));
        pos.mark(Money::from_i64(105));

        assert_eq!(pos.unrealized_pnl(), Money::from_i64(50));
        assert_eq!(pos.unrealized_pnl_percent(), dec!(5));
        assert_eq!(pos.market_value(), Money::from_i64(1050));
    }
}

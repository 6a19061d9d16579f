//! Derived portfolio views.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Position;
use crate::domain::shared::{Money, PortfolioId, Quantity, Symbol, Timestamp, UserId};

/// One position as it appears in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionView {
    /// Instrument.
    pub symbol: Symbol,
    /// Signed quantity.
    pub quantity: Quantity,
    /// Average entry price.
    pub average_price: Money,
    /// Reference price used.
    pub current_price: Money,
    /// `current_price * quantity`.
    pub market_value: Money,
    /// Average price times absolute quantity.
    pub cost_basis: Money,
    /// `(current - avg) * quantity`.
    pub unrealized_pnl: Money,
    /// Unrealized P&L over cost basis, in percent.
    pub unrealized_pnl_percent: Decimal,
    /// Realized P&L to date.
    pub realized_pnl: Money,
    /// `market_value / total_value`.
    pub weight: Decimal,
}

impl PositionView {
    /// Build a view from a marked position; weight is filled in later.
    #[must_use]
    pub fn from_position(position: &Position) -> Self {
        Self {
            symbol: position.symbol.clone(),
            quantity: position.quantity,
            average_price: position.average_price,
            current_price: position.last_price,
            market_value: position.market_value(),
            cost_basis: position.cost_basis(),
            unrealized_pnl: position.unrealized_pnl(),
            unrealized_pnl_percent: position.unrealized_pnl_percent(),
            realized_pnl: position.realized_pnl,
            weight: Decimal::ZERO,
        }
    }
}

/// A consistent point-in-time view of one portfolio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    /// Portfolio.
    pub portfolio_id: PortfolioId,
    /// Owner.
    pub user_id: UserId,
    /// Cash balance.
    pub cash: Money,
    /// Sum of cost bases of open positions.
    pub invested_value: Money,
    /// Sum of market values of open positions.
    pub market_value: Money,
    /// `cash + market_value`.
    pub total_value: Money,
    /// Unrealized plus realized P&L over all positions.
    pub total_pnl: Money,
    /// `total_pnl / invested_value`, zero when nothing is invested.
    pub total_return: Decimal,
    /// Change in total value since the start of the day.
    pub day_pnl: Money,
    /// `day_pnl` over start-of-day value.
    pub day_return: Decimal,
    /// Open positions.
    pub positions: Vec<PositionView>,
    /// When the snapshot was taken.
    pub as_of: Timestamp,
}

impl PortfolioSnapshot {
    /// Aggregate marked positions into a snapshot.
    ///
    /// Flat positions are skipped for every aggregate except total P&L, which
    /// keeps the realized P&L they booked.
    #[must_use]
    pub fn compute(
        portfolio_id: PortfolioId,
        user_id: UserId,
        cash: Money,
        positions: &[Position],
        day_start_value: Option<Money>,
    ) -> Self {
        let mut views: Vec<PositionView> = positions
            .iter()
            .filter(|p| !p.is_flat())
            .map(PositionView::from_position)
            .collect();

        let invested_value: Money = views.iter().map(|v| v.cost_basis).sum();
        let market_value: Money = views.iter().map(|v| v.market_value).sum();
        let total_value = cash + market_value;
        let total_pnl: Money = positions
            .iter()
            .map(|p| p.unrealized_pnl() + p.realized_pnl)
            .sum();

        for view in &mut views {
            view.weight = view.market_value.ratio_to(total_value);
        }

        let baseline = day_start_value.unwrap_or(total_value);
        let day_pnl = total_value - baseline;

        Self {
            portfolio_id,
            user_id,
            cash,
            invested_value,
            market_value,
            total_value,
            total_pnl,
            total_return: total_pnl.ratio_to(invested_value),
            day_pnl,
            day_return: day_pnl.ratio_to(baseline),
            positions: views,
            as_of: Timestamp::now(),
        }
    }
}

/// End-of-day record appended once per portfolio per trading day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    /// Portfolio.
    pub portfolio_id: PortfolioId,
    /// Trading day.
    pub date: NaiveDate,
    /// Total value at the close.
    pub total_value: Money,
    /// Cash at the close.
    pub cash: Money,
    /// Day P&L.
    pub day_pnl: Money,
    /// Day return.
    pub day_return: Decimal,
    /// Cumulative P&L.
    pub total_pnl: Money,
    /// Cumulative return.
    pub total_return: Decimal,
}

impl PerformanceRecord {
    /// Capture the close from a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: &PortfolioSnapshot, date: NaiveDate) -> Self {
        Self {
            portfolio_id: snapshot.portfolio_id.clone(),
            date,
            total_value: snapshot.total_value,
            cash: snapshot.cash,
            day_pnl: snapshot.day_pnl,
            day_return: snapshot.day_return,
            total_pnl: snapshot.total_pnl,
            total_return: snapshot.total_return,
        }
    }
}

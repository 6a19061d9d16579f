//! Daily risk ledger.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::shared::{Money, PortfolioId};

/// A user's running totals for one trading day plus the emergency halt flag.
///
/// Daily P&L is realized P&L booked today plus the current unrealized P&L
/// of every open position, marked per portfolio by the latest snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskLedger {
    /// Trading day the totals belong to.
    pub trading_date: NaiveDate,
    /// Realized P&L booked today.
    pub daily_pnl: Money,
    /// Unrealized P&L of open positions, by portfolio. Replaced on every
    /// snapshot and not cleared by the daily roll.
    #[serde(default)]
    pub unrealized: BTreeMap<PortfolioId, Money>,
    /// Fills booked today.
    pub trade_count: u32,
    /// Sticky halt; only an explicit clear resets it.
    pub halted: bool,
    /// Why the halt was set.
    pub halt_reason: Option<String>,
}

impl RiskLedger {
    /// Empty ledger for a trading day.
    #[must_use]
    pub const fn new(trading_date: NaiveDate) -> Self {
        Self {
            trading_date,
            daily_pnl: Money::ZERO,
            unrealized: BTreeMap::new(),
            trade_count: 0,
            halted: false,
            halt_reason: None,
        }
    }

    /// Unrealized P&L summed over portfolios.
    #[must_use]
    pub fn unrealized_pnl(&self) -> Money {
        self.unrealized.values().copied().sum()
    }

    /// Realized plus unrealized P&L.
    #[must_use]
    pub fn total_pnl(&self) -> Money {
        self.daily_pnl + self.unrealized_pnl()
    }

    /// Book one fill. Returns `true` when this trade newly set the halt
    /// because cumulative loss reached `max_daily_loss`.
    pub fn record_trade(&mut self, realized_pnl: Money, max_daily_loss: Money) -> bool {
        self.trade_count = self.trade_count.saturating_add(1);
        self.daily_pnl += realized_pnl;
        self.halt_on_loss(max_daily_loss)
    }

    /// Replace one portfolio's unrealized P&L. Returns `true` when the new
    /// mark newly set the halt.
    pub fn mark_unrealized(
        &mut self,
        portfolio_id: PortfolioId,
        unrealized_pnl: Money,
        max_daily_loss: Money,
    ) -> bool {
        self.unrealized.insert(portfolio_id, unrealized_pnl);
        self.halt_on_loss(max_daily_loss)
    }

    fn halt_on_loss(&mut self, max_daily_loss: Money) -> bool {
        let total = self.total_pnl();
        if !self.halted && -total >= max_daily_loss {
            self.halt(format!(
                "daily loss {} reached limit {}",
                total.abs(),
                max_daily_loss
            ));
            return true;
        }
        false
    }

    /// Set the halt flag.
    pub fn halt(&mut self, reason: impl Into<String>) {
        self.halted = true;
        self.halt_reason = Some(reason.into());
    }

    /// Clear the halt flag.
    pub fn clear_halt(&mut self) {
        self.halted = false;
        self.halt_reason = None;
    }

    /// Start a new trading day. The halt flag carries over.
    pub fn roll_to(&mut self, trading_date: NaiveDate) {
        self.trading_date = trading_date;
        self.daily_pnl = Money::ZERO;
        self.trade_count = 0;
    }
}

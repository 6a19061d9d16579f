//! Per-user risk limits.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::TradingHours;
use crate::domain::risk_management::errors::RiskError;
use crate::domain::shared::{Money, Symbol};

/// Limits applied by every admission check for one user.
///
/// Always replaced as a whole so a concurrent check never sees a mix of old
/// and new fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    /// Largest notional a single order may carry.
    pub max_order_notional: Money,
    /// Daily loss at which trading halts.
    pub max_daily_loss: Money,
    /// Largest notional a single position may reach.
    pub max_position_notional: Money,
    /// Largest share of portfolio value held in open positions.
    pub max_portfolio_risk_fraction: Decimal,
    /// Fills allowed per trading day.
    pub max_daily_trades: u32,
    /// When non-empty, only these symbols may trade.
    pub allowed_symbols: BTreeSet<Symbol>,
    /// Symbols that may never trade.
    pub blocked_symbols: BTreeSet<Symbol>,
    /// Admission window; `None` admits around the clock.
    pub trading_hours: Option<TradingHours>,
    /// Fraction of notional assumed lost when an order carries no stop.
    pub default_stop_loss_fraction: Decimal,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_order_notional: Money::from_i64(50_000),
            max_daily_loss: Money::from_i64(5_000),
            max_position_notional: Money::from_i64(100_000),
            max_portfolio_risk_fraction: dec!(0.8),
            max_daily_trades: 100,
            allowed_symbols: BTreeSet::new(),
            blocked_symbols: BTreeSet::new(),
            trading_hours: None,
            default_stop_loss_fraction: dec!(0.02),
        }
    }
}

impl RiskLimits {
    /// Whether a symbol passes the allow and block lists.
    #[must_use]
    pub fn permits_symbol(&self, symbol: &Symbol) -> bool {
        if self.blocked_symbols.contains(symbol) {
            return false;
        }
        self.allowed_symbols.is_empty() || self.allowed_symbols.contains(symbol)
    }

    /// Check every limit is in range.
    ///
    /// # Errors
    ///
    /// Returns [`RiskError::InvalidLimits`] naming the first bad field.
    pub fn validate(&self) -> Result<(), RiskError> {
        let positive = [
            ("max_order_notional", self.max_order_notional),
            ("max_daily_loss", self.max_daily_loss),
            ("max_position_notional", self.max_position_notional),
        ];
        for (field, value) in positive {
            if !value.is_positive() {
                return Err(RiskError::InvalidLimits {
                    field: field.to_string(),
                    message: format!("must be positive, got {value}"),
                });
            }
        }

        let fractions = [
            ("max_portfolio_risk_fraction", self.max_portfolio_risk_fraction),
            ("default_stop_loss_fraction", self.default_stop_loss_fraction),
        ];
        for (field, value) in fractions {
            if value <= Decimal::ZERO || value > Decimal::ONE {
                return Err(RiskError::InvalidLimits {
                    field: field.to_string(),
                    message: format!("must be in (0, 1], got {value}"),
                });
            }
        }

        if self.max_daily_trades == 0 {
            return Err(RiskError::InvalidLimits {
                field: "max_daily_trades".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if let Some(symbol) = self.allowed_symbols.intersection(&self.blocked_symbols).next() {
            return Err(RiskError::InvalidLimits {
                field: "blocked_symbols".to_string(),
                message: format!("{symbol} is both allowed and blocked"),
            });
        }

        Ok(())
    }
}

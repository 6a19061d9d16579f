//! Admission check inputs and verdict.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::order_execution::value_objects::OrderSide;
use crate::domain::shared::{Money, Quantity, Symbol};

/// The order being admitted, priced at the current reference price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskCandidate {
    /// Instrument.
    pub symbol: Symbol,
    /// Side.
    pub side: OrderSide,
    /// Requested quantity.
    pub quantity: Quantity,
    /// Price used for notional and exposure.
    pub reference_price: Money,
    /// Protective stop, bounding the downside when present.
    pub stop_price: Option<Money>,
}

impl RiskCandidate {
    /// `quantity * reference_price`.
    #[must_use]
    pub fn notional(&self) -> Money {
        self.reference_price * self.quantity
    }
}

/// An open position as seen by the admission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionExposure {
    /// Instrument.
    pub symbol: Symbol,
    /// Signed quantity.
    pub quantity: Quantity,
    /// Latest known price.
    pub market_price: Money,
}

impl PositionExposure {
    /// Absolute market value.
    #[must_use]
    pub fn gross_value(&self) -> Money {
        (self.market_price * self.quantity).abs()
    }
}

/// Which admission check produced a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskCheck {
    /// User is under emergency halt.
    EmergencyHalt,
    /// Outside the trading window.
    TradingHours,
    /// Symbol blocked or not allowed.
    SymbolRestriction,
    /// Daily trade count exhausted.
    DailyTradeLimit,
    /// No positive reference price to size the order with.
    ReferencePrice,
    /// Order notional above the per-order cap.
    OrderNotional,
    /// Resulting position above the per-position cap.
    PositionNotional,
    /// Portfolio exposure above the allowed fraction.
    PortfolioRisk,
    /// Worst-case loss would breach the daily loss limit.
    DailyLoss,
}

impl fmt::Display for RiskCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::EmergencyHalt => "EMERGENCY_HALT",
            Self::TradingHours => "TRADING_HOURS",
            Self::SymbolRestriction => "SYMBOL_RESTRICTION",
            Self::DailyTradeLimit => "DAILY_TRADE_LIMIT",
            Self::ReferencePrice => "REFERENCE_PRICE",
            Self::OrderNotional => "ORDER_NOTIONAL",
            Self::PositionNotional => "POSITION_NOTIONAL",
            Self::PortfolioRisk => "PORTFOLIO_RISK",
            Self::DailyLoss => "DAILY_LOSS",
        };
        f.write_str(s)
    }
}

/// Result of an admission check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskDecision {
    /// Whether the order may proceed.
    pub allowed: bool,
    /// Rejection reason.
    pub reason: Option<String>,
    /// Largest quantity that would pass the failing size check.
    pub suggested_quantity: Option<Quantity>,
    /// Blended utilization in `[0, 1]`; zero on rejection.
    pub risk_score: f64,
    /// The failing check.
    pub failed_check: Option<RiskCheck>,
}

impl RiskDecision {
    /// An approval with the given score.
    #[must_use]
    pub const fn approve(risk_score: f64) -> Self {
        Self {
            allowed: true,
            reason: None,
            suggested_quantity: None,
            risk_score,
            failed_check: None,
        }
    }

    /// A rejection.
    #[must_use]
    pub fn reject(check: RiskCheck, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            suggested_quantity: None,
            risk_score: 0.0,
            failed_check: Some(check),
        }
    }

    /// Attach a down-sized quantity.
    #[must_use]
    pub fn with_suggestion(mut self, quantity: Quantity) -> Self {
        self.suggested_quantity = Some(quantity);
        self
    }
}

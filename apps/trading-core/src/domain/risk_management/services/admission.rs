//! Pre-trade admission check.
//!
//! A pure function of limits, ledger, candidate, positions, portfolio value
//! and the clock. Checks run in a fixed order and stop at the first failure.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::domain::order_execution::value_objects::OrderSide;
use crate::domain::risk_management::value_objects::{
    PositionExposure, RiskCandidate, RiskCheck, RiskDecision, RiskLedger, RiskLimits,
};
use crate::domain::shared::{Money, Quantity};

const ORDER_SIZE_WEIGHT: f64 = 0.3;
const EXPOSURE_WEIGHT: f64 = 0.3;
const TRADE_COUNT_WEIGHT: f64 = 0.2;
const DAILY_PNL_WEIGHT: f64 = 0.2;

/// Everything one admission check reads.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionInput<'a> {
    /// User limits.
    pub limits: &'a RiskLimits,
    /// User ledger for today.
    pub ledger: &'a RiskLedger,
    /// Order under review.
    pub candidate: &'a RiskCandidate,
    /// Open positions of the target portfolio.
    pub positions: &'a [PositionExposure],
    /// Cash plus market value of the target portfolio.
    pub portfolio_value: Money,
    /// Evaluation time.
    pub now: DateTime<Utc>,
}

/// Risk admission procedure.
pub struct RiskAdmission;

impl RiskAdmission {
    /// Run every check in order.
    #[must_use]
    pub fn evaluate(input: &AdmissionInput<'_>) -> RiskDecision {
        let AdmissionInput {
            limits,
            ledger,
            candidate,
            positions,
            portfolio_value,
            now,
        } = *input;

        if ledger.halted {
            let why = ledger.halt_reason.as_deref().unwrap_or("no reason recorded");
            return RiskDecision::reject(
                RiskCheck::EmergencyHalt,
                format!("trading halted for user: {why}"),
            );
        }

        if let Some(hours) = limits.trading_hours {
            if !hours.contains(now) {
                return RiskDecision::reject(
                    RiskCheck::TradingHours,
                    format!(
                        "outside trading hours {}-{}",
                        hours.start.format("%H:%M"),
                        hours.end.format("%H:%M")
                    ),
                );
            }
        }

        if !limits.permits_symbol(&candidate.symbol) {
            return RiskDecision::reject(
                RiskCheck::SymbolRestriction,
                format!("symbol {} is not permitted", candidate.symbol),
            );
        }

        if ledger.trade_count >= limits.max_daily_trades {
            return RiskDecision::reject(
                RiskCheck::DailyTradeLimit,
                format!(
                    "daily trade limit reached ({}/{})",
                    ledger.trade_count, limits.max_daily_trades
                ),
            );
        }

        let price = candidate.reference_price;
        if !price.is_positive() {
            return RiskDecision::reject(
                RiskCheck::ReferencePrice,
                format!("no usable reference price for {}", candidate.symbol),
            );
        }

        let notional = candidate.notional();
        if notional > limits.max_order_notional {
            return RiskDecision::reject(
                RiskCheck::OrderNotional,
                format!(
                    "order notional {notional} exceeds limit {}",
                    limits.max_order_notional
                ),
            )
            .with_suggestion(Self::shares_within(limits.max_order_notional, price));
        }

        let current_qty = positions
            .iter()
            .filter(|p| p.symbol == candidate.symbol)
            .map(|p| p.quantity)
            .sum::<Quantity>();
        let signed = candidate.quantity * candidate.side.sign();
        let resulting = (price * (current_qty + signed)).abs();
        if resulting > limits.max_position_notional && resulting > (price * current_qty).abs() {
            let room = limits.max_position_notional - (price * current_qty).abs();
            return RiskDecision::reject(
                RiskCheck::PositionNotional,
                format!(
                    "position notional {resulting} would exceed limit {}",
                    limits.max_position_notional
                ),
            )
            .with_suggestion(Self::shares_within(room, price));
        }

        if !portfolio_value.is_positive() {
            return RiskDecision::reject(
                RiskCheck::PortfolioRisk,
                format!("portfolio value {portfolio_value} leaves no risk capacity"),
            )
            .with_suggestion(Quantity::ZERO);
        }
        // Gross exposure after the trade, with the candidate's symbol restated
        // at its resulting quantity. Trades that shrink exposure always pass.
        let existing: Money = positions.iter().map(PositionExposure::gross_value).sum();
        let symbol_existing: Money = positions
            .iter()
            .filter(|p| p.symbol == candidate.symbol)
            .map(PositionExposure::gross_value)
            .sum();
        let post_trade = existing - symbol_existing + resulting;
        let total_fraction = post_trade.ratio_to(portfolio_value);
        if total_fraction > limits.max_portfolio_risk_fraction && post_trade > existing {
            let capacity = portfolio_value * limits.max_portfolio_risk_fraction - existing;
            return RiskDecision::reject(
                RiskCheck::PortfolioRisk,
                format!(
                    "portfolio exposure {:.1}% would exceed limit {:.1}%",
                    total_fraction * Decimal::ONE_HUNDRED,
                    limits.max_portfolio_risk_fraction * Decimal::ONE_HUNDRED
                ),
            )
            .with_suggestion(Self::shares_within(capacity, price));
        }

        let daily_pnl = ledger.total_pnl();
        let downside = Self::estimated_downside(candidate, limits);
        let projected = daily_pnl - downside;
        if -projected > limits.max_daily_loss {
            return RiskDecision::reject(
                RiskCheck::DailyLoss,
                format!(
                    "daily loss limit {} would be breached: current P&L {daily_pnl}, worst case {projected}",
                    limits.max_daily_loss
                ),
            );
        }

        let score = ORDER_SIZE_WEIGHT * Self::utilization(notional, limits.max_order_notional)
            + EXPOSURE_WEIGHT
                * Self::clamped(total_fraction, limits.max_portfolio_risk_fraction)
            + TRADE_COUNT_WEIGHT
                * Self::clamped(
                    Decimal::from(ledger.trade_count),
                    Decimal::from(limits.max_daily_trades),
                )
            + DAILY_PNL_WEIGHT * Self::utilization(daily_pnl.abs(), limits.max_daily_loss);

        RiskDecision::approve(score.clamp(0.0, 1.0))
    }

    /// Worst-case loss of the candidate: bounded by its stop when it has one,
    /// otherwise a fixed fraction of notional.
    #[must_use]
    pub fn estimated_downside(candidate: &RiskCandidate, limits: &RiskLimits) -> Money {
        match candidate.stop_price {
            Some(stop) => {
                let per_share = match candidate.side {
                    OrderSide::Buy => candidate.reference_price - stop,
                    OrderSide::Sell => stop - candidate.reference_price,
                };
                (per_share * candidate.quantity).max(Money::ZERO)
            }
            None => candidate.notional() * limits.default_stop_loss_fraction,
        }
    }

    fn shares_within(budget: Money, price: Money) -> Quantity {
        if !budget.is_positive() || !price.is_positive() {
            return Quantity::ZERO;
        }
        Quantity::new(budget.ratio_to(price)).floor()
    }

    fn utilization(value: Money, limit: Money) -> f64 {
        Self::clamped(value.amount(), limit.amount())
    }

    fn clamped(value: Decimal, limit: Decimal) -> f64 {
        if limit <= Decimal::ZERO {
            return if value > Decimal::ZERO { 1.0 } else { 0.0 };
        }
        (value / limit).to_f64().unwrap_or(1.0).clamp(0.0, 1.0)
    }
}

//! Commission and fee schedule applied to every execution.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::value_objects::OrderSide;
use crate::domain::shared::{Money, Quantity};

/// Per-share commission with a per-fill minimum, plus a regulatory fee
/// charged on sell notional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Commission charged per share executed.
    pub per_share_commission: Decimal,
    /// Minimum commission for a single fill.
    pub minimum_commission: Decimal,
    /// Fraction of sell notional charged as regulatory fee.
    pub sell_fee_rate: Decimal,
}

/// Costs of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeeBreakdown {
    /// Broker commission.
    pub commission: Money,
    /// Regulatory fees.
    pub fees: Money,
}

impl FeeBreakdown {
    /// Commission plus fees.
    #[must_use]
    pub fn total(&self) -> Money {
        self.commission + self.fees
    }
}

impl FeeSchedule {
    /// $0.005 per share.
    const DEFAULT_PER_SHARE: Decimal = Decimal::from_parts(5, 0, 0, false, 3);

    /// $1.00 minimum.
    const DEFAULT_MINIMUM: Decimal = Decimal::ONE;

    /// A schedule that charges nothing.
    #[must_use]
    pub const fn free() -> Self {
        Self {
            per_share_commission: Decimal::ZERO,
            minimum_commission: Decimal::ZERO,
            sell_fee_rate: Decimal::ZERO,
        }
    }

    /// Costs for executing `quantity` at `price`, rounded to cents.
    #[must_use]
    pub fn calculate(&self, side: OrderSide, quantity: Quantity, price: Money) -> FeeBreakdown {
        let commission = (quantity.abs().amount() * self.per_share_commission)
            .max(self.minimum_commission)
            .round_dp(2);

        let fees = match side {
            OrderSide::Sell => ((price * quantity).amount().abs() * self.sell_fee_rate).round_dp(2),
            OrderSide::Buy => Decimal::ZERO,
        };

        FeeBreakdown {
            commission: Money::new(commission),
            fees: Money::new(fees),
        }
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            per_share_commission: Self::DEFAULT_PER_SHARE,
            minimum_commission: Self::DEFAULT_MINIMUM,
            sell_fee_rate: Decimal::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn small_fill_pays_minimum() {
        let fees = FeeSchedule::default().calculate(
            OrderSide::Buy,
            Quantity::from_i64(10),
            Money::from_i64(100),
        );
        assert_eq!(fees.commission, Money::from_i64(1));
        assert_eq!(fees.fees, Money::ZERO);
    }

    #[test]
    fn large_fill_pays_per_share() {
        let fees = FeeSchedule::default().calculate(
            OrderSide::Buy,
            Quantity::from_i64(1_000),
            Money::from_i64(10),
        );
        assert_eq!(fees.commission, Money::from_i64(5));
    }

    #[test]
    fn regulatory_fee_only_on_sells() {
        let schedule = FeeSchedule {
            sell_fee_rate: dec!(0.0000278),
            ..FeeSchedule::free()
        };
        let sell = schedule.calculate(OrderSide::Sell, Quantity::from_i64(100), Money::from_i64(150));
        let buy = schedule.calculate(OrderSide::Buy, Quantity::from_i64(100), Money::from_i64(150));
        assert_eq!(sell.fees, Money::new(dec!(0.42)));
        assert_eq!(buy.total(), Money::ZERO);
    }
}

//! Money value object for currency amounts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

use super::Quantity;

/// A monetary amount or a per-unit price in account currency.
///
/// Internal precision is the full `Decimal`; display rounds to cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Zero amount.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Wrap a `Decimal`.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Amount in whole currency units.
    #[must_use]
    pub fn from_i64(amount: i64) -> Self {
        Self(Decimal::from(amount))
    }

    /// Amount from integer cents.
    #[must_use]
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    /// Inner `Decimal`.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// True when strictly greater than zero.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// True when strictly less than zero.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// True when exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Absolute value.
    #[must_use]
    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    /// Round to cents.
    #[must_use]
    pub fn round(&self) -> Self {
        Self(self.0.round_dp(2))
    }

    /// Ratio of two amounts, `0` when the divisor is zero.
    #[must_use]
    pub fn ratio_to(&self, divisor: Self) -> Decimal {
        if divisor.is_zero() {
            Decimal::ZERO
        } else {
            self.0 / divisor.0
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Mul<Decimal> for Money {
    type Output = Self;

    fn mul(self, rhs: Decimal) -> Self::Output {
        Self(self.0 * rhs)
    }
}

/// Price times quantity gives a notional amount.
impl Mul<Quantity> for Money {
    type Output = Self;

    fn mul(self, rhs: Quantity) -> Self::Output {
        Self(self.0 * rhs.amount())
    }
}

impl Div<Decimal> for Money {
    type Output = Self;

    fn div(self, rhs: Decimal) -> Self::Output {
        Self(self.0 / rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn display_rounds_to_cents() {
        assert_eq!(Money::new(dec!(150.505)).to_string(), "$150.50");
        assert_eq!(Money::from_cents(15050).to_string(), "$150.50");
    }

    #[test]
    fn price_times_quantity_is_notional() {
        let notional = Money::from_i64(50) * Quantity::from_i64(1_000);
        assert_eq!(notional, Money::from_i64(50_000));
    }

    #[test]
    fn ratio_guards_zero_divisor() {
        assert_eq!(Money::from_i64(10).ratio_to(Money::ZERO), Decimal::ZERO);
        assert_eq!(Money::from_i64(10).ratio_to(Money::from_i64(40)), dec!(0.25));
    }

    #[test]
    fn sums_and_signs() {
        let total: Money = [Money::from_i64(5), Money::from_i64(-8)].into_iter().sum();
        assert!(total.is_negative());
        assert_eq!(total.abs(), Money::from_i64(3));
        assert_eq!(-total, Money::from_i64(3));
    }
}

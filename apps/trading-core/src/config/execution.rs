//! Order execution configuration.

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::FeeSchedule;

/// Order execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Master switch; when off every submission is refused.
    #[serde(default = "default_true")]
    pub live_trading_enabled: bool,
    /// Route orders to the simulated broker instead of a real one.
    #[serde(default = "default_true")]
    pub simulation_mode: bool,
    /// Buffer size of the execution report channel.
    #[serde(default = "default_report_channel_capacity")]
    pub report_channel_capacity: usize,
    /// Seconds a broker submit or cancel may take before it counts as failed.
    #[serde(default = "default_broker_timeout")]
    pub broker_timeout_secs: u64,
    /// Commission and fee model.
    #[serde(default)]
    pub fees: FeeConfig,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            live_trading_enabled: true,
            simulation_mode: true,
            report_channel_capacity: default_report_channel_capacity(),
            broker_timeout_secs: default_broker_timeout(),
            fees: FeeConfig::default(),
        }
    }
}

impl ExecutionConfig {
    /// Broker call timeout as a duration.
    #[must_use]
    pub const fn broker_timeout(&self) -> Duration {
        Duration::from_secs(self.broker_timeout_secs)
    }
}

/// Commission and fee model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Commission per share.
    #[serde(default = "default_per_share_commission")]
    pub per_share_commission: Decimal,
    /// Floor applied to each fill's commission.
    #[serde(default = "default_minimum_commission")]
    pub minimum_commission: Decimal,
    /// Regulatory fee rate on sell notional.
    #[serde(default)]
    pub sell_fee_rate: Decimal,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            per_share_commission: default_per_share_commission(),
            minimum_commission: default_minimum_commission(),
            sell_fee_rate: Decimal::ZERO,
        }
    }
}

impl FeeConfig {
    /// Convert to the domain fee schedule.
    #[must_use]
    pub fn to_fee_schedule(&self) -> FeeSchedule {
        FeeSchedule {
            per_share_commission: self.per_share_commission,
            minimum_commission: self.minimum_commission,
            sell_fee_rate: self.sell_fee_rate,
        }
    }
}

pub(super) const fn default_true() -> bool {
    true
}

const fn default_report_channel_capacity() -> usize {
    1024
}

const fn default_broker_timeout() -> u64 {
    30
}

fn default_per_share_commission() -> Decimal {
    dec!(0.005)
}

const fn default_minimum_commission() -> Decimal {
    Decimal::ONE
}

//! Position and portfolio tracking configuration.

use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Position and portfolio tracking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Milliseconds between portfolio recomputations.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_ms: u64,
    /// Local time at which the daily performance record is written.
    #[serde(default = "default_market_close")]
    pub market_close: NaiveTime,
    /// UTC offset of the market's timezone.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval(),
            market_close: default_market_close(),
            utc_offset_minutes: 0,
        }
    }
}

impl TrackingConfig {
    /// Refresh interval as a duration.
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

const fn default_refresh_interval() -> u64 {
    1_000
}

fn default_market_close() -> NaiveTime {
    NaiveTime::from_hms_opt(16, 0, 0).unwrap_or(NaiveTime::MIN)
}

//! Daily trading window.

use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Window of local wall-clock time in which orders are admitted.
///
/// A window whose `start` is after its `end` spans midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingHours {
    /// Opening time, inclusive.
    pub start: NaiveTime,
    /// Closing time, exclusive.
    pub end: NaiveTime,
    /// Offset of the local clock from UTC, in minutes.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl TradingHours {
    /// True when `now` falls inside the window.
    #[must_use]
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let Some(offset) = FixedOffset::east_opt(self.utc_offset_minutes * 60) else {
            return false;
        };
        let local = now.with_timezone(&offset).time();
        if self.start <= self.end {
            local >= self.start && local < self.end
        } else {
            local >= self.start || local < self.end
        }
    }
}

//! Time in force for orders.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How long an order stays eligible for execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    /// Valid for the current trading day.
    #[default]
    Day,
    /// Good until cancelled.
    Gtc,
    /// Immediate-or-cancel: execute what is possible now, cancel the rest.
    Ioc,
    /// Fill-or-kill: execute the whole quantity at once or not at all.
    Fok,
}

impl TimeInForce {
    /// True for IOC and FOK.
    #[must_use]
    pub const fn is_immediate(&self) -> bool {
        matches!(self, Self::Ioc | Self::Fok)
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Day => write!(f, "DAY"),
            Self::Gtc => write!(f, "GTC"),
            Self::Ioc => write!(f, "IOC"),
            Self::Fok => write!(f, "FOK"),
        }
    }
}

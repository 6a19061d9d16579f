//! Risk governor configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::risk_management::RiskLimits;

/// Risk governor configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Limits for users without an explicit entry.
    #[serde(default)]
    pub default_limits: RiskLimits,
    /// Per-user limits keyed by user id.
    #[serde(default)]
    pub user_limits: BTreeMap<String, RiskLimits>,
    /// UTC offset of the timezone whose midnight resets daily ledgers.
    #[serde(default)]
    pub reset_utc_offset_minutes: i32,
}

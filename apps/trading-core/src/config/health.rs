//! Connection health monitor configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection health monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Seconds between probes of one connection.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Seconds a probe may take before it counts as failed.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    /// Consecutive failures that deactivate a connection.
    #[serde(default = "default_retry_ceiling")]
    pub retry_ceiling: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            probe_timeout_secs: default_probe_timeout(),
            retry_ceiling: default_retry_ceiling(),
        }
    }
}

impl HealthConfig {
    /// Probe interval as a duration.
    #[must_use]
    pub const fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Probe timeout as a duration.
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

const fn default_check_interval() -> u64 {
    60
}

const fn default_probe_timeout() -> u64 {
    30
}

const fn default_retry_ceiling() -> u32 {
    3
}

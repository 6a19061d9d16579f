//! Per-connection health record and the streak rules around it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::shared::{ConnectionId, Timestamp, UserId};

/// Lifecycle of a monitored connection. Absence of a record means the
/// connection is not monitored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// Last probe succeeded, or no probe has run yet.
    Healthy,
    /// Last probe failed; the streak is below the ceiling.
    Unhealthy,
    /// Streak reached the ceiling. Terminal.
    Deactivated,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "HEALTHY"),
            Self::Unhealthy => write!(f, "UNHEALTHY"),
            Self::Deactivated => write!(f, "DEACTIVATED"),
        }
    }
}

/// Status change worth persisting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthTransition {
    /// First failure of a streak.
    Disconnected,
    /// First success after a streak.
    Reconnected,
    /// Streak reached the ceiling.
    Deactivated,
}

/// What one probe result changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeEffect {
    /// Transitions to persist, in order.
    pub transitions: Vec<HealthTransition>,
    /// Whether the healthy/unhealthy verdict flipped.
    pub verdict_changed: bool,
}

impl ProbeEffect {
    /// True when the probe deactivated the connection.
    #[must_use]
    pub fn deactivated(&self) -> bool {
        self.transitions.contains(&HealthTransition::Deactivated)
    }
}

/// Health of one broker connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Connection.
    pub connection_id: ConnectionId,
    /// Owner, notified on deactivation.
    pub user_id: UserId,
    /// Lifecycle state.
    pub state: ConnectionState,
    /// Verdict of the last probe.
    pub healthy: bool,
    /// When the last probe finished.
    pub last_checked: Option<Timestamp>,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Error of the last failed probe.
    pub last_error: Option<String>,
    /// Round trip of the last probe that returned.
    pub last_latency_ms: Option<u64>,
    /// Set by the first failure of a streak, cleared on reconnect.
    pub was_disconnected: bool,
}

impl HealthRecord {
    /// Record for a connection entering monitoring.
    #[must_use]
    pub const fn new(connection_id: ConnectionId, user_id: UserId) -> Self {
        Self {
            connection_id,
            user_id,
            state: ConnectionState::Healthy,
            healthy: true,
            last_checked: None,
            consecutive_failures: 0,
            last_error: None,
            last_latency_ms: None,
            was_disconnected: false,
        }
    }

    /// True once deactivated.
    #[must_use]
    pub fn is_deactivated(&self) -> bool {
        self.state == ConnectionState::Deactivated
    }

    /// Apply a successful probe.
    pub fn record_success(&mut self, latency_ms: u64, now: Timestamp) -> ProbeEffect {
        let mut effect = ProbeEffect {
            verdict_changed: !self.healthy,
            ..ProbeEffect::default()
        };
        if self.was_disconnected {
            self.was_disconnected = false;
            effect.transitions.push(HealthTransition::Reconnected);
        }

        self.state = ConnectionState::Healthy;
        self.healthy = true;
        self.consecutive_failures = 0;
        self.last_error = None;
        self.last_latency_ms = Some(latency_ms);
        self.last_checked = Some(now);
        effect
    }

    /// Apply a failed probe. `retry_ceiling` consecutive failures deactivate.
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        latency_ms: Option<u64>,
        now: Timestamp,
        retry_ceiling: u32,
    ) -> ProbeEffect {
        let mut effect = ProbeEffect {
            verdict_changed: self.healthy,
            ..ProbeEffect::default()
        };

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures == 1 {
            self.was_disconnected = true;
            effect.transitions.push(HealthTransition::Disconnected);
        }

        self.healthy = false;
        self.state = ConnectionState::Unhealthy;
        self.last_error = Some(error.into());
        if latency_ms.is_some() {
            self.last_latency_ms = latency_ms;
        }
        self.last_checked = Some(now);

        if self.consecutive_failures >= retry_ceiling {
            self.state = ConnectionState::Deactivated;
            effect.transitions.push(HealthTransition::Deactivated);
        }
        effect
    }
}

/// Aggregate view over the monitored connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStats {
    /// Connections under monitoring.
    pub total: usize,
    /// Connections whose last verdict was healthy.
    pub healthy: usize,
    /// Connections whose last verdict was unhealthy.
    pub unhealthy: usize,
    /// Mean latency over records that have one.
    pub mean_latency_ms: Option<f64>,
}

impl HealthStats {
    /// Compute stats from a set of records.
    #[must_use]
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a HealthRecord>) -> Self {
        let mut total = 0;
        let mut healthy = 0;
        let mut latency_sum = 0_u64;
        let mut latency_count = 0_u64;

        for record in records {
            total += 1;
            if record.healthy {
                healthy += 1;
            }
            if let Some(ms) = record.last_latency_ms {
                latency_sum = latency_sum.saturating_add(ms);
                latency_count += 1;
            }
        }

        Self {
            total,
            healthy,
            unhealthy: total - healthy,
            mean_latency_ms: (latency_count > 0)
                .then(|| latency_sum as f64 / latency_count as f64),
        }
    }
}

//! Connection Health Monitor Service
//!
//! Probes every registered broker connection on a fixed interval. A failure
//! streak reaching the retry ceiling deactivates the connection for good:
//! its timer stops, the record leaves the live registry, and the owner gets
//! exactly one notification. Deactivated ids stay visible to order flow
//! through `ConnectionStatusPort` until the connection is registered again.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    BrokerPort, ConnectionHealthRepository, ConnectionStatusPort, EventPublisherPort,
    TransitionRecord,
};
use crate::config::HealthConfig;
use crate::domain::connection_health::{HealthRecord, HealthStats, ProbeEffect};
use crate::domain::events::{DomainEvent, NotificationSeverity};
use crate::domain::shared::{ConnectionId, Timestamp, UserId};
use crate::error::CoreError;
use crate::observability;

/// Configuration for the connection health monitor.
#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    /// Time between probes of one connection.
    pub check_interval: Duration,
    /// Time a probe may take before it counts as failed.
    pub probe_timeout: Duration,
    /// Consecutive failures that deactivate a connection.
    pub retry_ceiling: u32,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self::from(&HealthConfig::default())
    }
}

impl From<&HealthConfig> for HealthMonitorConfig {
    fn from(config: &HealthConfig) -> Self {
        Self {
            check_interval: config.check_interval(),
            probe_timeout: config.probe_timeout(),
            retry_ceiling: config.retry_ceiling.max(1),
        }
    }
}

struct MonitoredConnection {
    record: HealthRecord,
    broker: Arc<dyn BrokerPort>,
    probe_lock: Arc<tokio::sync::Mutex<()>>,
    timer: CancellationToken,
}

/// Periodic broker connection probing.
pub struct ConnectionHealthMonitor {
    config: HealthMonitorConfig,
    connections: RwLock<HashMap<ConnectionId, MonitoredConnection>>,
    deactivated: RwLock<HashSet<ConnectionId>>,
    repository: Arc<dyn ConnectionHealthRepository>,
    events: Arc<dyn EventPublisherPort>,
}

impl ConnectionHealthMonitor {
    /// Create a new monitor.
    #[must_use]
    pub fn new(
        config: HealthMonitorConfig,
        repository: Arc<dyn ConnectionHealthRepository>,
        events: Arc<dyn EventPublisherPort>,
    ) -> Self {
        Self {
            config,
            connections: RwLock::new(HashMap::new()),
            deactivated: RwLock::new(HashSet::new()),
            repository,
            events,
        }
    }

    /// Register a connection and start its probe timer. The first probe runs
    /// immediately. Returns `false` when the connection is already monitored.
    /// Registering a deactivated connection again makes it usable.
    pub async fn start_monitoring(
        self: &Arc<Self>,
        connection_id: ConnectionId,
        user_id: UserId,
        broker: Arc<dyn BrokerPort>,
    ) -> bool {
        let record = HealthRecord::new(connection_id.clone(), user_id);
        let timer = CancellationToken::new();
        {
            let mut connections = self.connections.write();
            if connections.contains_key(&connection_id) {
                return false;
            }
            connections.insert(
                connection_id.clone(),
                MonitoredConnection {
                    record: record.clone(),
                    broker,
                    probe_lock: Arc::new(tokio::sync::Mutex::new(())),
                    timer: timer.clone(),
                },
            );
            observability::update_monitored_connections(connections.len());
        }
        self.deactivated.write().remove(&connection_id);

        if let Err(e) = self.repository.save(&record).await {
            tracing::warn!(error = %e, connection_id = %connection_id, "Failed to persist health record");
        }

        let monitor = Arc::clone(self);
        let check_interval = self.config.check_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(check_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match monitor.probe(&connection_id).await {
                            Some(record) if !record.is_deactivated() => {}
                            _ => break,
                        }
                    }
                    () = timer.cancelled() => {
                        break;
                    }
                }
            }
            tracing::debug!(connection_id = %connection_id, "Health probe timer stopped");
        });

        true
    }

    /// Stop monitoring a connection and drop its record. Returns `false`
    /// when it was not monitored.
    pub fn stop_monitoring(&self, connection_id: &ConnectionId) -> bool {
        let mut connections = self.connections.write();
        let removed = connections.remove(connection_id);
        observability::update_monitored_connections(connections.len());
        drop(connections);

        match removed {
            Some(connection) => {
                connection.timer.cancel();
                tracing::info!(connection_id = %connection_id, "Stopped monitoring connection");
                true
            }
            None => false,
        }
    }

    /// Stop every timer and clear the registry.
    pub fn stop_all(&self) {
        let drained: Vec<_> = self.connections.write().drain().collect();
        for (_, connection) in &drained {
            connection.timer.cancel();
        }
        observability::update_monitored_connections(0);
        tracing::info!(count = drained.len(), "Stopped all health monitoring");
    }

    /// Run one probe now, outside the timer.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the connection is not monitored, including
    /// after deactivation.
    pub async fn force_check(&self, connection_id: &ConnectionId) -> Result<HealthRecord, CoreError> {
        self.probe(connection_id)
            .await
            .ok_or_else(|| CoreError::not_found("connection", connection_id))
    }

    /// Current record of a connection.
    #[must_use]
    pub fn record(&self, connection_id: &ConnectionId) -> Option<HealthRecord> {
        self.connections
            .read()
            .get(connection_id)
            .map(|c| c.record.clone())
    }

    /// Records of every monitored connection, ordered by id.
    #[must_use]
    pub fn records(&self) -> Vec<HealthRecord> {
        let mut records: Vec<_> = self
            .connections
            .read()
            .values()
            .map(|c| c.record.clone())
            .collect();
        records.sort_by(|a, b| a.connection_id.cmp(&b.connection_id));
        records
    }

    /// Aggregate view over the monitored connections.
    #[must_use]
    pub fn stats(&self) -> HealthStats {
        let connections = self.connections.read();
        HealthStats::from_records(connections.values().map(|c| &c.record))
    }

    /// Whether a connection is monitored.
    #[must_use]
    pub fn is_monitored(&self, connection_id: &ConnectionId) -> bool {
        self.connections.read().contains_key(connection_id)
    }

    /// Probe once. Probes of one connection never overlap. Returns `None`
    /// when the connection is not (or no longer) monitored.
    async fn probe(&self, connection_id: &ConnectionId) -> Option<HealthRecord> {
        let (broker, probe_lock) = {
            let connections = self.connections.read();
            let connection = connections.get(connection_id)?;
            (Arc::clone(&connection.broker), Arc::clone(&connection.probe_lock))
        };
        let _probe_guard = probe_lock.lock().await;
        if !self.is_monitored(connection_id) {
            return None;
        }

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.config.probe_timeout, broker.test_connection()).await;
        let elapsed = started.elapsed();
        let latency_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let now = Timestamp::now();

        let (record, effect) = {
            let mut connections = self.connections.write();
            let connection = connections.get_mut(connection_id)?;
            let effect = match &outcome {
                Ok(Ok(())) => connection.record.record_success(latency_ms, now),
                Ok(Err(e)) => connection.record.record_failure(
                    e.to_string(),
                    Some(latency_ms),
                    now,
                    self.config.retry_ceiling,
                ),
                Err(_) => connection.record.record_failure(
                    format!(
                        "health check timed out after {}ms",
                        self.config.probe_timeout.as_millis()
                    ),
                    None,
                    now,
                    self.config.retry_ceiling,
                ),
            };
            let record = connection.record.clone();
            if effect.deactivated() {
                if let Some(removed) = connections.remove(connection_id) {
                    removed.timer.cancel();
                }
                observability::update_monitored_connections(connections.len());
                self.deactivated.write().insert(connection_id.clone());
            }
            (record, effect)
        };

        observability::record_health_probe(record.healthy, elapsed.as_secs_f64());
        if !record.healthy {
            tracing::warn!(
                connection_id = %connection_id,
                consecutive_failures = record.consecutive_failures,
                error = record.last_error.as_deref().unwrap_or_default(),
                "Broker health check failed"
            );
        }

        self.persist(&record, &effect, now).await;
        self.announce(&record, &effect).await;
        Some(record)
    }

    async fn persist(&self, record: &HealthRecord, effect: &ProbeEffect, at: Timestamp) {
        if let Err(e) = self.repository.save(record).await {
            tracing::warn!(error = %e, connection_id = %record.connection_id, "Failed to persist health record");
        }
        for transition in &effect.transitions {
            let entry = TransitionRecord {
                connection_id: record.connection_id.clone(),
                transition: *transition,
                error: record.last_error.clone(),
                at,
            };
            if let Err(e) = self.repository.record_transition(entry).await {
                tracing::warn!(error = %e, connection_id = %record.connection_id, "Failed to persist health transition");
            }
        }
    }

    async fn announce(&self, record: &HealthRecord, effect: &ProbeEffect) {
        let mut events = Vec::new();
        if effect.verdict_changed || effect.deactivated() {
            events.push(DomainEvent::ConnectionHealthChanged {
                connection_id: record.connection_id.clone(),
                user_id: record.user_id.clone(),
                healthy: record.healthy,
                state: record.state,
                error: record.last_error.clone(),
            });
        }

        if effect.deactivated() {
            observability::record_connection_deactivated();
            let reason = record.last_error.as_deref().unwrap_or("unknown error");
            tracing::error!(
                connection_id = %record.connection_id,
                user_id = %record.user_id,
                consecutive_failures = record.consecutive_failures,
                reason,
                "Broker connection deactivated"
            );
            events.push(DomainEvent::UserNotification {
                user_id: record.user_id.clone(),
                severity: NotificationSeverity::Critical,
                title: "Broker connection deactivated".to_string(),
                message: format!(
                    "Connection {} failed {} consecutive health checks: {reason}",
                    record.connection_id, record.consecutive_failures
                ),
            });
        }

        if let Err(e) = self.events.publish_all(events).await {
            tracing::warn!(error = %e, connection_id = %record.connection_id, "Failed to publish health events");
        }
    }
}

impl ConnectionStatusPort for ConnectionHealthMonitor {
    fn is_deactivated(&self, connection_id: &ConnectionId) -> bool {
        self.deactivated.read().contains(connection_id)
    }
}

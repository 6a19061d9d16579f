//! Prometheus metrics for the trading core.
//!
//! Recording functions are no-ops until a recorder is installed, so library
//! users and tests may call them freely.
//!
//! # Example
//!
//! ```ignore
//! use trading_core::observability::{init_metrics, MetricsConfig};
//!
//! init_metrics(&MetricsConfig::with_addr("0.0.0.0:9090".parse()?))?;
//! ```

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{Ipv4Addr, SocketAddr};

/// Configuration for the metrics exporter.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Address to bind the metrics HTTP listener.
    pub listen_addr: SocketAddr,
    /// Histogram buckets for latency measurements (in seconds).
    pub latency_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 9090)),
            // 1ms to 30s, wide enough for probe timeouts
            latency_buckets: vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 30.0],
        }
    }
}

impl MetricsConfig {
    /// Create a new metrics configuration with custom address.
    #[must_use]
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            listen_addr: addr,
            ..Default::default()
        }
    }
}

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to configure metrics exporter.
    #[error("metrics configuration error: {0}")]
    Configuration(String),
    /// Failed to install metrics exporter.
    #[error("metrics installation error: {0}")]
    Installation(String),
}

/// Initialize the Prometheus metrics exporter.
///
/// This starts an HTTP server that exposes metrics at `/metrics`.
///
/// # Errors
///
/// Returns an error if the metrics exporter fails to start (e.g., port already in use).
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(config.listen_addr)
        .set_buckets(&config.latency_buckets)
        .map_err(|e| MetricsError::Configuration(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    tracing::info!(
        addr = %config.listen_addr,
        "Prometheus metrics exporter started"
    );

    Ok(())
}

// ============================================================================
// Order Execution Metrics
// ============================================================================

/// Record an order accepted by the broker.
pub fn record_order_submission(order_type: &str, latency_seconds: f64) {
    counter!("order_submissions_total", "order_type" => order_type.to_string()).increment(1);
    histogram!("order_submit_latency_seconds", "order_type" => order_type.to_string())
        .record(latency_seconds);
}

/// Record a refused submission.
///
/// `stage` is `validation`, `risk`, `broker`, or `disabled`.
pub fn record_order_rejection(stage: &str) {
    counter!("order_rejections_total", "stage" => stage.to_string()).increment(1);
}

/// Record an applied execution.
pub fn record_order_fill(order_type: &str, complete: bool) {
    counter!(
        "order_fills_total",
        "order_type" => order_type.to_string(),
        "complete" => complete.to_string()
    )
    .increment(1);
}

/// Record a cancelled order.
pub fn record_order_cancel(reason: &str) {
    counter!("order_cancels_total", "reason" => reason.to_string()).increment(1);
}

// ============================================================================
// Risk Metrics
// ============================================================================

/// Record an admission verdict.
pub fn record_risk_decision(allowed: bool, check: &str) {
    counter!(
        "risk_decisions_total",
        "allowed" => allowed.to_string(),
        "check" => check.to_string()
    )
    .increment(1);
}

/// Record a user entering emergency halt.
pub fn record_emergency_halt() {
    counter!("risk_emergency_halts_total").increment(1);
}

// ============================================================================
// Connection Health Metrics
// ============================================================================

/// Record one probe.
pub fn record_health_probe(healthy: bool, latency_seconds: f64) {
    counter!("health_probes_total", "healthy" => healthy.to_string()).increment(1);
    histogram!("health_probe_latency_seconds").record(latency_seconds);
}

/// Record a deactivated connection.
pub fn record_connection_deactivated() {
    counter!("health_deactivations_total").increment(1);
}

/// Update the monitored connection gauge.
pub fn update_monitored_connections(count: usize) {
    gauge!("health_monitored_connections").set(count as f64);
}

// ============================================================================
// Portfolio Metrics
// ============================================================================

/// Record a portfolio recomputation.
pub fn record_portfolio_refresh(duration_seconds: f64) {
    counter!("portfolio_refreshes_total").increment(1);
    histogram!("portfolio_refresh_seconds").record(duration_seconds);
}

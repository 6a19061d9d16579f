//! Observability module for metrics.
//!
//! Prometheus export plus recording helpers used across the core.

mod metrics;

pub use metrics::{
    MetricsConfig, MetricsError, init_metrics, record_connection_deactivated,
    record_emergency_halt, record_health_probe, record_order_cancel, record_order_fill,
    record_order_rejection, record_order_submission, record_portfolio_refresh,
    record_risk_decision, update_monitored_connections,
};

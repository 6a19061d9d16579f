//! Application Services
//!
//! Long-lived services that coordinate domain logic and adapters. Each owns
//! its own state and, where it has timers, a start/stop pair driven by a
//! cancellation token.

mod connection_health_monitor;
mod order_execution_engine;
mod position_tracker;
mod risk_governor;

pub use connection_health_monitor::{ConnectionHealthMonitor, HealthMonitorConfig};
pub use order_execution_engine::{EmergencyStopResult, EngineConfig, OrderExecutionEngine};
pub use position_tracker::{FillApplication, PositionTracker, RiskView, TrackerConfig};
pub use risk_governor::{RiskGovernor, RiskGovernorConfig};

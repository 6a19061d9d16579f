//! Application Layer
//!
//! Orchestrates the domain through long-lived services.
//!
//! - **Ports**: interfaces to brokers, market data, persistence and the
//!   event sink
//! - **Services**: execution engine, risk governor, health monitor and
//!   position tracker

pub mod ports;
pub mod services;

pub use ports::*;
pub use services::*;

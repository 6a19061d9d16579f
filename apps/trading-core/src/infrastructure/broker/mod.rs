//! Broker Adapters
//!
//! Implementations of `BrokerPort`.

pub mod simulated;

pub use simulated::{SimulatedBroker, SimulatedBrokerConfig};

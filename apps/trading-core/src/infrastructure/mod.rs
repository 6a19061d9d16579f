//! Infrastructure Layer
//!
//! Adapters implementing the ports defined in the application layer:
//!
//! - `broker/`: simulated broker pushing executions into the report channel
//! - `events/`: broadcast fan-out and recording publishers
//! - `market_data/`: in-memory reference prices
//! - `persistence/`: in-memory repositories

pub mod broker;
pub mod events;
pub mod market_data;
pub mod persistence;

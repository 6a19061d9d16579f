//! Persistence Adapters
//!
//! Implementations of the repository traits. Only the in-memory store
//! exists; a durable adapter plugs in behind the same traits.

pub mod in_memory;

pub use in_memory::{
    InMemoryConnectionHealthRepository, InMemoryOrderRepository, InMemoryPerformanceRepository,
    InMemoryPositionRepository, InMemoryRiskLimitsRepository,
};

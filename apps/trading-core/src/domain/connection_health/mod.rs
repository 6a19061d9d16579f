//! Connection Health Bounded Context
//!
//! Probe verdicts, failure streaks and deactivation of broker connections.

mod health_record;

pub use health_record::{
    ConnectionState, HealthRecord, HealthStats, HealthTransition, ProbeEffect,
};

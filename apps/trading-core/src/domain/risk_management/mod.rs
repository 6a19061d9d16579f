//! Risk Management Bounded Context
//!
//! Pre-trade admission and the per-user daily risk ledger.
//!
//! # Key Concepts
//!
//! - **Risk limits**: per-user caps, replaced atomically
//! - **Risk ledger**: daily P&L, trade count and the sticky emergency halt
//! - **Admission**: ordered checks that approve, reject or down-size an order

pub mod errors;
pub mod services;
pub mod value_objects;

pub use errors::RiskError;
pub use services::{AdmissionInput, RiskAdmission};
pub use value_objects::{
    PositionExposure, RiskCandidate, RiskCheck, RiskDecision, RiskLedger, RiskLimits,
    TradingHours,
};

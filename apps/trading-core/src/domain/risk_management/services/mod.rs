//! Risk Management Domain Services

mod admission;

pub use admission::{AdmissionInput, RiskAdmission};

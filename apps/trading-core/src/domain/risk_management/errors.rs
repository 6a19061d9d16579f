//! Risk management errors.

use thiserror::Error;

/// Errors raised while configuring risk limits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RiskError {
    /// A limit value is out of range.
    #[error("invalid risk limit '{field}': {message}")]
    InvalidLimits {
        /// Offending field.
        field: String,
        /// What is wrong.
        message: String,
    },
}

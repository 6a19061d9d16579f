//! Domain errors shared by every bounded context.

use thiserror::Error;

/// Business-rule failures independent of any adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// A field holds a value the domain does not accept.
    #[error("invalid value for '{field}': {message}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// A lifecycle transition that the state graph forbids.
    #[error("invalid state transition for {entity}: {from} -> {to}")]
    InvalidStateTransition {
        /// Entity type (e.g. "Order").
        entity: String,
        /// Current state.
        from: String,
        /// Attempted state.
        to: String,
    },

    /// An aggregate invariant would be broken.
    #[error("invariant violation in {aggregate}: {invariant}")]
    InvariantViolation {
        /// Aggregate type.
        aggregate: String,
        /// The invariant and the offending values.
        invariant: String,
    },
}

/// Failure reported by a persistence adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("persistence failure in {store}: {message}")]
pub struct PersistenceError {
    /// Store that failed (e.g. "orders").
    pub store: String,
    /// Adapter message.
    pub message: String,
}

impl PersistenceError {
    /// Build an error for a named store.
    #[must_use]
    pub fn new(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            message: message.into(),
        }
    }
}

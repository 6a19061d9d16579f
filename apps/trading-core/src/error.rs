//! Top-level error type of the trading core.
//!
//! Every bounded-context error converges on [`CoreError`], which carries a
//! stable [`ErrorCode`] for callers that map errors onto a transport.
//!
//! | Code | Meaning |
//! |------|---------|
//! | `VALIDATION` | Malformed order or limits |
//! | `RISK_REJECTED` | Admission check refused the order |
//! | `CONNECTIVITY` | Broker unreachable, timed out or rate limited |
//! | `AUTHENTICATION` | Broker refused the credentials |
//! | `BROKER_REJECTED` | Broker refused the order |
//! | `STATE_CONFLICT` | Entity is in a state that forbids the action |
//! | `NOT_FOUND` | Unknown order or portfolio |
//! | `FORBIDDEN` | Caller does not own the entity |
//! | `TRADING_DISABLED` | Live trading switched off |
//! | `PERSISTENCE` | Write-through store failed |

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::ports::BrokerError;
use crate::domain::order_execution::OrderError;
use crate::domain::portfolio::PortfolioError;
use crate::domain::risk_management::{RiskCheck, RiskError};
use crate::domain::shared::{DomainError, PersistenceError, Quantity};

/// Stable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed input.
    Validation,
    /// Refused by risk admission.
    RiskRejected,
    /// Broker unreachable.
    Connectivity,
    /// Broker credentials refused.
    Authentication,
    /// Broker refused the order.
    BrokerRejected,
    /// Entity state forbids the action.
    StateConflict,
    /// Entity does not exist.
    NotFound,
    /// Caller does not own the entity.
    Forbidden,
    /// Live trading is switched off.
    TradingDisabled,
    /// Store failure.
    Persistence,
}

impl ErrorCode {
    /// Get the error reason string.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::RiskRejected => "RISK_REJECTED",
            Self::Connectivity => "CONNECTIVITY",
            Self::Authentication => "AUTHENTICATION",
            Self::BrokerRejected => "BROKER_REJECTED",
            Self::StateConflict => "STATE_CONFLICT",
            Self::NotFound => "NOT_FOUND",
            Self::Forbidden => "FORBIDDEN",
            Self::TradingDisabled => "TRADING_DISABLED",
            Self::Persistence => "PERSISTENCE",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason())
    }
}

/// Errors surfaced by the application services.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Malformed input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Refused by risk admission.
    #[error("risk check {check} rejected order: {reason}")]
    RiskRejection {
        /// Check that failed.
        check: RiskCheck,
        /// Human-readable reason.
        reason: String,
        /// Largest quantity that would pass, when one exists.
        suggested_quantity: Option<Quantity>,
    },

    /// Broker or price feed unreachable, timed out or rate limited.
    #[error("connectivity: {0}")]
    Connectivity(String),

    /// Broker refused the credentials.
    #[error("broker authentication: {0}")]
    Authentication(String),

    /// Broker refused the order.
    #[error("broker rejected order: {0}")]
    BrokerRejected(String),

    /// Entity state forbids the action.
    #[error("state conflict: {0}")]
    StateConflict(String),

    /// Entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind.
        entity: &'static str,
        /// Identifier.
        id: String,
    },

    /// Caller does not own the entity.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Live trading is switched off.
    #[error("live trading is disabled")]
    TradingDisabled,

    /// Store failure.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl CoreError {
    /// Get the error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::Validation,
            Self::RiskRejection { .. } => ErrorCode::RiskRejected,
            Self::Connectivity(_) => ErrorCode::Connectivity,
            Self::Authentication(_) => ErrorCode::Authentication,
            Self::BrokerRejected(_) => ErrorCode::BrokerRejected,
            Self::StateConflict(_) => ErrorCode::StateConflict,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Forbidden(_) => ErrorCode::Forbidden,
            Self::TradingDisabled => ErrorCode::TradingDisabled,
            Self::Persistence(_) => ErrorCode::Persistence,
        }
    }

    /// Not-found constructor.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<OrderError> for CoreError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidParameters { .. } => Self::Validation(err.to_string()),
            _ => Self::StateConflict(err.to_string()),
        }
    }
}

impl From<BrokerError> for CoreError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Authentication { message } => Self::Authentication(message),
            BrokerError::Rejected { reason } => Self::BrokerRejected(reason),
            BrokerError::NotFound { order_id } => Self::not_found("broker order", order_id),
            BrokerError::RateLimited { .. }
            | BrokerError::Connectivity { .. }
            | BrokerError::Timeout { .. } => Self::Connectivity(err.to_string()),
        }
    }
}

impl From<RiskError> for CoreError {
    fn from(err: RiskError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<PortfolioError> for CoreError {
    fn from(err: PortfolioError) -> Self {
        match err {
            PortfolioError::NotOpen { portfolio_id } => Self::not_found("portfolio", portfolio_id),
            PortfolioError::OwnerMismatch { .. } => Self::Forbidden(err.to_string()),
            PortfolioError::NegativeInitialCash => Self::Validation(err.to_string()),
            PortfolioError::StalePrices { .. } => Self::Connectivity(err.to_string()),
        }
    }
}

impl From<DomainError> for CoreError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidValue { .. } => Self::Validation(err.to_string()),
            DomainError::InvalidStateTransition { .. } | DomainError::InvariantViolation { .. } => {
                Self::StateConflict(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order_execution::OrderStatus;

    #[test]
    fn test_broker_error_mapping() {
        let auth: CoreError = BrokerError::Authentication {
            message: "bad key".into(),
        }
        .into();
        assert_eq!(auth.code(), ErrorCode::Authentication);

        let timeout: CoreError = BrokerError::Timeout { after_ms: 30_000 }.into();
        assert_eq!(timeout.code(), ErrorCode::Connectivity);

        let rejected: CoreError = BrokerError::Rejected {
            reason: "symbol halted".into(),
        }
        .into();
        assert_eq!(rejected.code(), ErrorCode::BrokerRejected);
        assert!(rejected.to_string().contains("symbol halted"));
    }

    #[test]
    fn test_order_error_mapping() {
        let invalid: CoreError = OrderError::InvalidParameters {
            field: "quantity".into(),
            message: "must be positive".into(),
        }
        .into();
        assert_eq!(invalid.code(), ErrorCode::Validation);

        let conflict: CoreError = OrderError::CannotCancel {
            status: OrderStatus::Filled,
        }
        .into();
        assert_eq!(conflict.code(), ErrorCode::StateConflict);
    }

    #[test]
    fn test_stale_prices_mapping() {
        use crate::domain::shared::{PortfolioId, Symbol};

        let stale: CoreError = PortfolioError::StalePrices {
            portfolio_id: PortfolioId::new("p-1"),
            symbols: vec![Symbol::new("MSFT"), Symbol::new("TSLA")],
        }
        .into();
        assert_eq!(stale.code(), ErrorCode::Connectivity);
        assert!(stale.to_string().contains("MSFT, TSLA"));
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::RiskRejected.to_string(), "RISK_REJECTED");
        assert_eq!(
            CoreError::not_found("order", "ord-1").to_string(),
            "order not found: ord-1"
        );
    }
}

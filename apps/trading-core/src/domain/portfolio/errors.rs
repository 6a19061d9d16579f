//! Portfolio errors.

use thiserror::Error;

use crate::domain::shared::{PortfolioId, Symbol, UserId};

/// Errors raised by portfolio bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortfolioError {
    /// No cash ledger was opened for the portfolio.
    #[error("portfolio not open: {portfolio_id}")]
    NotOpen {
        /// Portfolio.
        portfolio_id: PortfolioId,
    },

    /// The portfolio belongs to another user.
    #[error("portfolio {portfolio_id} is not owned by {user_id}")]
    OwnerMismatch {
        /// Portfolio.
        portfolio_id: PortfolioId,
        /// User that attempted the change.
        user_id: UserId,
    },

    /// Opening balance must not be negative.
    #[error("initial cash must not be negative")]
    NegativeInitialCash,

    /// Open positions without a fresh reference price; no snapshot is built.
    #[error("no fresh price for {} in portfolio {portfolio_id}", joined(.symbols))]
    StalePrices {
        /// Portfolio.
        portfolio_id: PortfolioId,
        /// Symbols that could not be priced.
        symbols: Vec<Symbol>,
    },
}

fn joined(symbols: &[Symbol]) -> String {
    symbols
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

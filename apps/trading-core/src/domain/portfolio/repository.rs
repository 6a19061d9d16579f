//! Portfolio persistence traits.

use async_trait::async_trait;

use super::{PerformanceRecord, Position};
use crate::domain::shared::{PersistenceError, PortfolioId, Symbol};

/// Write-through store for positions.
#[async_trait]
pub trait PositionRepository: Send + Sync {
    /// Insert or replace a position.
    ///
    /// # Errors
    ///
    /// Returns error if the store rejects the write.
    async fn save(&self, position: &Position) -> Result<(), PersistenceError>;

    /// Position of one symbol in a portfolio.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn find(
        &self,
        portfolio_id: &PortfolioId,
        symbol: &Symbol,
    ) -> Result<Option<Position>, PersistenceError>;

    /// Every position of a portfolio, flat ones included.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn find_by_portfolio(
        &self,
        portfolio_id: &PortfolioId,
    ) -> Result<Vec<Position>, PersistenceError>;
}

/// Append-only store for daily performance.
#[async_trait]
pub trait PerformanceRepository: Send + Sync {
    /// Append a record.
    ///
    /// # Errors
    ///
    /// Returns error if the store rejects the write.
    async fn append(&self, record: &PerformanceRecord) -> Result<(), PersistenceError>;

    /// History of a portfolio, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn history(
        &self,
        portfolio_id: &PortfolioId,
    ) -> Result<Vec<PerformanceRecord>, PersistenceError>;
}

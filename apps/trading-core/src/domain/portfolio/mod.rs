//! Portfolio Bounded Context
//!
//! Positions, cash-adjusted snapshots and the daily performance history.

pub mod errors;
pub mod position;
pub mod repository;
pub mod snapshot;

pub use errors::PortfolioError;
pub use position::Position;
pub use repository::{PerformanceRepository, PositionRepository};
pub use snapshot::{PerformanceRecord, PortfolioSnapshot, PositionView};

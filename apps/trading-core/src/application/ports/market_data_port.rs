//! Market Data Port (Driven Port)
//!
//! Reference prices used for execution, risk and valuation.

use async_trait::async_trait;

use crate::domain::shared::{Money, Symbol};

/// Source of reference prices.
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Latest reference price, or `None` when the symbol has no price.
    async fn reference_price(&self, symbol: &Symbol) -> Option<Money>;
}

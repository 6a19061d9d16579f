//! Market Data Adapters
//!
//! In-memory quote cache implementing `MarketDataPort`, with an optional
//! random walk that keeps simulated prices moving.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use crate::application::ports::MarketDataPort;
use crate::domain::shared::{Money, Symbol, Timestamp};

/// Cached quote with timestamp.
#[derive(Debug, Clone, Copy)]
struct CachedQuote {
    price: Money,
    updated_at: Timestamp,
}

/// In-memory reference prices.
#[derive(Debug, Default)]
pub struct InMemoryMarketData {
    quotes: RwLock<HashMap<Symbol, CachedQuote>>,
}

impl InMemoryMarketData {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache seeded with prices.
    #[must_use]
    pub fn with_prices<S: Into<Symbol>>(prices: impl IntoIterator<Item = (S, Money)>) -> Self {
        let cache = Self::new();
        for (symbol, price) in prices {
            cache.set_price(symbol, price);
        }
        cache
    }

    /// Set the reference price of a symbol.
    pub fn set_price(&self, symbol: impl Into<Symbol>, price: Money) {
        self.quotes.write().insert(
            symbol.into(),
            CachedQuote {
                price,
                updated_at: Timestamp::now(),
            },
        );
    }

    /// Drop a symbol's price.
    pub fn clear_price(&self, symbol: &Symbol) -> bool {
        self.quotes.write().remove(symbol).is_some()
    }

    /// When a symbol was last priced.
    #[must_use]
    pub fn updated_at(&self, symbol: &Symbol) -> Option<Timestamp> {
        self.quotes.read().get(symbol).map(|q| q.updated_at)
    }

    /// Symbols with a price, sorted.
    #[must_use]
    pub fn symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self.quotes.read().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Move every price by a uniform random fraction in
    /// `[-max_step, max_step]`, rounded to cents and floored at one cent.
    pub fn step(&self, rng: &mut impl Rng, max_step: Decimal) {
        let now = Timestamp::now();
        let bound = max_step.abs();
        let mut quotes = self.quotes.write();
        for quote in quotes.values_mut() {
            let step = if bound.is_zero() {
                Decimal::ZERO
            } else {
                let basis_points = rng.random_range(-10_000_i64..=10_000);
                bound * Decimal::new(basis_points, 4)
            };
            let next = (quote.price * (Decimal::ONE + step)).round();
            quote.price = next.max(Money::from_cents(1));
            quote.updated_at = now;
        }
    }

    /// Spawn a random walk over the cached prices until `shutdown` fires.
    pub fn spawn_random_walk(
        self: &Arc<Self>,
        interval: Duration,
        max_step: Decimal,
        seed: Option<u64>,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        let mut rng = seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        cache.step(&mut rng, max_step);
                    }
                    () = shutdown.cancelled() => {
                        tracing::debug!("Price random walk stopped");
                        break;
                    }
                }
            }
        })
    }
}

#[async_trait]
impl MarketDataPort for InMemoryMarketData {
    async fn reference_price(&self, symbol: &Symbol) -> Option<Money> {
        self.quotes.read().get(symbol).map(|q| q.price)
    }
}

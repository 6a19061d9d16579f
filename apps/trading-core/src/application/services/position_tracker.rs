//! Position & Portfolio Tracker Service
//!
//! Books fills into positions and cash, recomputes portfolio snapshots on a
//! fixed cadence, and appends one performance record per portfolio per day
//! at the market-close boundary.
//!
//! Each portfolio's book sits behind its own async mutex. A fill and a
//! recompute never interleave, so no snapshot shows a half-applied fill.
//! Recomputes of one portfolio also queue behind a second per-portfolio
//! lock, so snapshots are published in the order their prices were read.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::RiskGovernor;
use crate::application::ports::{EventPublisherPort, MarketDataPort};
use crate::config::TrackingConfig;
use crate::domain::events::DomainEvent;
use crate::domain::order_execution::Fill;
use crate::domain::portfolio::{
    PerformanceRecord, PerformanceRepository, PortfolioError, PortfolioSnapshot, Position,
    PositionRepository,
};
use crate::domain::risk_management::PositionExposure;
use crate::domain::shared::{Money, PortfolioId, Symbol, UserId};
use crate::error::CoreError;
use crate::observability;

/// Configuration for the position tracker.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Time between recomputations of a tracked portfolio.
    pub refresh_interval: Duration,
    /// Local time of the daily performance record.
    pub market_close: NaiveTime,
    /// UTC offset of the market's timezone, in minutes.
    pub utc_offset_minutes: i32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::from(&TrackingConfig::default())
    }
}

impl From<&TrackingConfig> for TrackerConfig {
    fn from(config: &TrackingConfig) -> Self {
        Self {
            refresh_interval: config.refresh_interval(),
            market_close: config.market_close,
            utc_offset_minutes: config.utc_offset_minutes,
        }
    }
}

/// Result of booking one fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillApplication {
    /// P&L the fill realized.
    pub realized_pnl: Money,
    /// Position after the fill.
    pub position: Position,
    /// Cash after the fill.
    pub cash: Money,
}

/// What risk admission needs to know about a portfolio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskView {
    /// Owner.
    pub user_id: UserId,
    /// Open positions.
    pub positions: Vec<PositionExposure>,
    /// Cash plus market value.
    pub portfolio_value: Money,
}

struct PortfolioBook {
    user_id: UserId,
    cash: Money,
    positions: BTreeMap<Symbol, Position>,
    day_start: Option<(NaiveDate, Money)>,
    latest: Option<PortfolioSnapshot>,
    last_recorded: Option<NaiveDate>,
}

impl PortfolioBook {
    fn market_value(&self) -> Money {
        self.positions.values().map(Position::market_value).sum()
    }
}

impl PortfolioBook {
    fn open_symbols(&self) -> Vec<Symbol> {
        self.positions
            .values()
            .filter(|p| !p.is_flat())
            .map(|p| p.symbol.clone())
            .collect()
    }
}

type BookHandle = Arc<tokio::sync::Mutex<PortfolioBook>>;
type RefreshLock = Arc<tokio::sync::Mutex<()>>;

/// Positions, cash and snapshots per portfolio.
pub struct PositionTracker {
    config: TrackerConfig,
    offset: FixedOffset,
    books: RwLock<HashMap<PortfolioId, BookHandle>>,
    refresh_locks: Mutex<HashMap<PortfolioId, RefreshLock>>,
    timers: Mutex<HashMap<PortfolioId, CancellationToken>>,
    close_task: Mutex<Option<CancellationToken>>,
    market_data: Arc<dyn MarketDataPort>,
    position_repository: Arc<dyn PositionRepository>,
    performance_repository: Arc<dyn PerformanceRepository>,
    events: Arc<dyn EventPublisherPort>,
    risk: Option<Arc<RiskGovernor>>,
}

impl PositionTracker {
    /// Create a new tracker.
    #[must_use]
    pub fn new(
        config: TrackerConfig,
        market_data: Arc<dyn MarketDataPort>,
        position_repository: Arc<dyn PositionRepository>,
        performance_repository: Arc<dyn PerformanceRepository>,
        events: Arc<dyn EventPublisherPort>,
    ) -> Self {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60).unwrap_or(Utc.fix());
        Self {
            config,
            offset,
            books: RwLock::new(HashMap::new()),
            refresh_locks: Mutex::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
            close_task: Mutex::new(None),
            market_data,
            position_repository,
            performance_repository,
            events,
            risk: None,
        }
    }

    /// Report each snapshot's unrealized P&L to the risk governor.
    #[must_use]
    pub fn with_risk_governor(mut self, risk: Arc<RiskGovernor>) -> Self {
        self.risk = Some(risk);
        self
    }

    // =========================================================================
    // Books
    // =========================================================================

    /// Open a cash ledger for a portfolio, restoring persisted positions.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for negative cash, `StateConflict` when already
    /// open, `Persistence` when positions cannot be loaded.
    pub async fn open_portfolio(
        &self,
        portfolio_id: &PortfolioId,
        user_id: &UserId,
        initial_cash: Money,
    ) -> Result<(), CoreError> {
        if initial_cash.is_negative() {
            return Err(PortfolioError::NegativeInitialCash.into());
        }
        if self.books.read().contains_key(portfolio_id) {
            return Err(CoreError::StateConflict(format!(
                "portfolio already open: {portfolio_id}"
            )));
        }

        let restored = self
            .position_repository
            .find_by_portfolio(portfolio_id)
            .await?;
        let positions: BTreeMap<Symbol, Position> = restored
            .into_iter()
            .map(|p| (p.symbol.clone(), p))
            .collect();

        let book = PortfolioBook {
            user_id: user_id.clone(),
            cash: initial_cash,
            positions,
            day_start: None,
            latest: None,
            last_recorded: None,
        };

        let mut books = self.books.write();
        if books.contains_key(portfolio_id) {
            return Err(CoreError::StateConflict(format!(
                "portfolio already open: {portfolio_id}"
            )));
        }
        books.insert(portfolio_id.clone(), Arc::new(tokio::sync::Mutex::new(book)));
        tracing::info!(portfolio_id = %portfolio_id, user_id = %user_id, cash = %initial_cash, "Portfolio opened");
        Ok(())
    }

    /// Whether a cash ledger is open for the portfolio.
    #[must_use]
    pub fn is_open(&self, portfolio_id: &PortfolioId) -> bool {
        self.books.read().contains_key(portfolio_id)
    }

    /// Book a fill into position and cash as one step.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unopened portfolio, `Forbidden` when the
    /// portfolio belongs to another user, `Persistence` when the position
    /// cannot be written. Nothing changes on error.
    pub async fn apply_fill(
        &self,
        fill: &Fill,
        user_id: &UserId,
        portfolio_id: &PortfolioId,
    ) -> Result<FillApplication, CoreError> {
        let handle = self.book(portfolio_id)?;
        let mut book = handle.lock().await;
        if &book.user_id != user_id {
            return Err(PortfolioError::OwnerMismatch {
                portfolio_id: portfolio_id.clone(),
                user_id: user_id.clone(),
            }
            .into());
        }

        let mut position = book.positions.get(&fill.symbol).cloned().unwrap_or_else(|| {
            Position::new(user_id.clone(), portfolio_id.clone(), fill.symbol.clone())
        });
        let realized_pnl = position.apply_fill(fill.side, fill.quantity, fill.price);
        self.position_repository.save(&position).await?;

        book.positions.insert(fill.symbol.clone(), position.clone());
        book.cash += fill.cash_delta();

        tracing::debug!(
            portfolio_id = %portfolio_id,
            symbol = %fill.symbol,
            quantity = %position.quantity,
            average_price = %position.average_price,
            realized_pnl = %realized_pnl,
            "Fill applied to position"
        );

        Ok(FillApplication {
            realized_pnl,
            position,
            cash: book.cash,
        })
    }

    /// Current cash of a portfolio.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unopened portfolio.
    pub async fn cash(&self, portfolio_id: &PortfolioId) -> Result<Money, CoreError> {
        let handle = self.book(portfolio_id)?;
        let book = handle.lock().await;
        Ok(book.cash)
    }

    /// Every position of a portfolio, flat ones included, ordered by symbol.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unopened portfolio.
    pub async fn positions(&self, portfolio_id: &PortfolioId) -> Result<Vec<Position>, CoreError> {
        let handle = self.book(portfolio_id)?;
        let book = handle.lock().await;
        Ok(book.positions.values().cloned().collect())
    }

    /// One position of a portfolio.
    pub async fn position(&self, portfolio_id: &PortfolioId, symbol: &Symbol) -> Option<Position> {
        let handle = self.book(portfolio_id).ok()?;
        let book = handle.lock().await;
        book.positions.get(symbol).cloned()
    }

    /// Open positions and portfolio value at the last known prices.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unopened portfolio.
    pub async fn risk_view(&self, portfolio_id: &PortfolioId) -> Result<RiskView, CoreError> {
        let handle = self.book(portfolio_id)?;
        let book = handle.lock().await;
        let positions = book
            .positions
            .values()
            .filter(|p| !p.is_flat())
            .map(|p| PositionExposure {
                symbol: p.symbol.clone(),
                quantity: p.quantity,
                market_price: p.last_price,
            })
            .collect();
        Ok(RiskView {
            user_id: book.user_id.clone(),
            positions,
            portfolio_value: book.cash + book.market_value(),
        })
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Recompute and publish a snapshot now.
    ///
    /// Every open position is marked at a fresh reference price. When any
    /// of them has none the snapshot is withheld and the last published one
    /// stays current.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unopened portfolio and `Connectivity` when
    /// open positions could not be priced.
    pub async fn refresh(&self, portfolio_id: &PortfolioId) -> Result<PortfolioSnapshot, CoreError> {
        let started = Instant::now();
        let handle = self.book(portfolio_id)?;
        let refresh_lock = self.refresh_lock(portfolio_id);
        let _refreshing = refresh_lock.lock().await;

        let symbols = handle.lock().await.open_symbols();
        let mut prices = self.fetch_prices(symbols).await;

        let today = self.local_date(Utc::now());
        let snapshot = {
            let mut book = handle.lock().await;
            // Fills may have opened symbols since the first fetch.
            let unpriced: Vec<Symbol> = book
                .open_symbols()
                .into_iter()
                .filter(|symbol| !prices.contains_key(symbol))
                .collect();
            if !unpriced.is_empty() {
                prices.extend(self.fetch_prices(unpriced).await);
            }

            let stale: Vec<Symbol> = book
                .open_symbols()
                .into_iter()
                .filter(|symbol| !prices.contains_key(symbol))
                .collect();
            if !stale.is_empty() {
                tracing::warn!(
                    portfolio_id = %portfolio_id,
                    symbols = ?stale,
                    "Snapshot withheld, open positions without a price"
                );
                return Err(PortfolioError::StalePrices {
                    portfolio_id: portfolio_id.clone(),
                    symbols: stale,
                }
                .into());
            }

            for (symbol, price) in &prices {
                if let Some(position) = book.positions.get_mut(symbol) {
                    if !position.is_flat() {
                        position.mark(*price);
                    }
                }
            }

            let baseline = match book.day_start {
                Some((date, value)) if date == today => Some(value),
                _ => None,
            };
            let positions: Vec<Position> = book.positions.values().cloned().collect();
            let snapshot = PortfolioSnapshot::compute(
                portfolio_id.clone(),
                book.user_id.clone(),
                book.cash,
                &positions,
                baseline,
            );
            if baseline.is_none() {
                book.day_start = Some((today, snapshot.total_value));
            }
            book.latest = Some(snapshot.clone());
            snapshot
        };

        if let Some(risk) = &self.risk {
            let unrealized: Money = snapshot.positions.iter().map(|p| p.unrealized_pnl).sum();
            risk.update_unrealized(&snapshot.user_id, portfolio_id, unrealized)
                .await;
        }

        observability::record_portfolio_refresh(started.elapsed().as_secs_f64());
        let event = DomainEvent::PortfolioSnapshot {
            snapshot: snapshot.clone(),
        };
        if let Err(e) = self.events.publish(event).await {
            tracing::warn!(error = %e, portfolio_id = %portfolio_id, "Failed to publish snapshot");
        }
        Ok(snapshot)
    }

    async fn fetch_prices(&self, symbols: Vec<Symbol>) -> HashMap<Symbol, Money> {
        let mut prices = HashMap::with_capacity(symbols.len());
        for symbol in symbols {
            match self.market_data.reference_price(&symbol).await {
                Some(price) => {
                    prices.insert(symbol, price);
                }
                None => {
                    tracing::debug!(symbol = %symbol, "No reference price");
                }
            }
        }
        prices
    }

    /// Refresh a portfolio if its timer is running; used after fills.
    pub async fn refresh_if_tracked(&self, portfolio_id: &PortfolioId) {
        if !self.is_tracking(portfolio_id) {
            return;
        }
        if let Err(e) = self.refresh(portfolio_id).await {
            tracing::warn!(error = %e, portfolio_id = %portfolio_id, "Post-fill refresh failed");
        }
    }

    /// Last published snapshot.
    pub async fn latest_snapshot(&self, portfolio_id: &PortfolioId) -> Option<PortfolioSnapshot> {
        let handle = self.book(portfolio_id).ok()?;
        let book = handle.lock().await;
        book.latest.clone()
    }

    // =========================================================================
    // Performance history
    // =========================================================================

    /// Append the performance record for `date`. Returns `None` when the
    /// date was already recorded.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unopened portfolio and `Persistence` when
    /// the history cannot be read or written.
    pub async fn record_daily_performance(
        &self,
        portfolio_id: &PortfolioId,
        date: NaiveDate,
    ) -> Result<Option<PerformanceRecord>, CoreError> {
        let snapshot = self.refresh(portfolio_id).await?;
        let handle = self.book(portfolio_id)?;
        let mut book = handle.lock().await;

        if book.last_recorded == Some(date) {
            return Ok(None);
        }
        let history = self.performance_repository.history(portfolio_id).await?;
        if history.iter().any(|r| r.date == date) {
            book.last_recorded = Some(date);
            return Ok(None);
        }

        let record = PerformanceRecord::from_snapshot(&snapshot, date);
        self.performance_repository.append(&record).await?;
        book.last_recorded = Some(date);
        book.day_start = Some((date, snapshot.total_value));

        tracing::info!(
            portfolio_id = %portfolio_id,
            date = %date,
            total_value = %record.total_value,
            day_pnl = %record.day_pnl,
            "Daily performance recorded"
        );
        Ok(Some(record))
    }

    /// Performance history, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` when the history cannot be read.
    pub async fn performance_history(
        &self,
        portfolio_id: &PortfolioId,
    ) -> Result<Vec<PerformanceRecord>, CoreError> {
        Ok(self.performance_repository.history(portfolio_id).await?)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start the recompute timer of a portfolio. Starting twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unopened portfolio.
    pub fn start_tracking(self: &Arc<Self>, portfolio_id: &PortfolioId) -> Result<(), CoreError> {
        self.book(portfolio_id)?;
        let mut timers = self.timers.lock();
        if timers.contains_key(portfolio_id) {
            return Ok(());
        }
        let shutdown = CancellationToken::new();
        timers.insert(portfolio_id.clone(), shutdown.clone());
        drop(timers);

        let tracker = Arc::clone(self);
        let portfolio_id = portfolio_id.clone();
        let refresh_interval = self.config.refresh_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(refresh_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(portfolio_id = %portfolio_id, "Portfolio tracking started");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = tracker.refresh(&portfolio_id).await {
                            tracing::warn!(error = %e, portfolio_id = %portfolio_id, "Portfolio refresh failed");
                        }
                    }
                    () = shutdown.cancelled() => {
                        tracing::info!(portfolio_id = %portfolio_id, "Portfolio tracking stopped");
                        break;
                    }
                }
            }
        });
        Ok(())
    }

    /// Stop the recompute timer of a portfolio.
    pub fn stop_tracking(&self, portfolio_id: &PortfolioId) -> bool {
        match self.timers.lock().remove(portfolio_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a portfolio's timer is running.
    #[must_use]
    pub fn is_tracking(&self, portfolio_id: &PortfolioId) -> bool {
        self.timers.lock().contains_key(portfolio_id)
    }

    /// Stop every recompute timer.
    pub fn stop_all(&self) {
        for (_, token) in self.timers.lock().drain() {
            token.cancel();
        }
    }

    /// Start the market-close task. Calling twice is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.close_task.lock();
        if slot.is_some() {
            return;
        }
        let shutdown = CancellationToken::new();
        *slot = Some(shutdown.clone());
        drop(slot);

        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let wait = tracker.until_next_close(Utc::now());
                tokio::select! {
                    () = tokio::time::sleep(wait) => {
                        tracker.record_all(tracker.local_date(Utc::now())).await;
                    }
                    () = shutdown.cancelled() => {
                        tracing::info!("Market close task shutting down");
                        break;
                    }
                }
            }
        });
    }

    /// Stop the market-close task and every recompute timer.
    pub fn stop(&self) {
        if let Some(token) = self.close_task.lock().take() {
            token.cancel();
        }
        self.stop_all();
    }

    async fn record_all(&self, date: NaiveDate) {
        let portfolios: Vec<PortfolioId> = self.books.read().keys().cloned().collect();
        for portfolio_id in portfolios {
            if let Err(e) = self.record_daily_performance(&portfolio_id, date).await {
                tracing::warn!(error = %e, portfolio_id = %portfolio_id, "Daily performance failed");
            }
        }
    }

    fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    fn until_next_close(&self, now: DateTime<Utc>) -> Duration {
        let local = now.with_timezone(&self.offset);
        let today_close = local.date_naive().and_time(self.config.market_close);
        let next_close = if local.naive_local() < today_close {
            Some(today_close)
        } else {
            local
                .date_naive()
                .succ_opt()
                .map(|d| d.and_time(self.config.market_close))
        };

        match next_close.and_then(|c| c.and_local_timezone(self.offset).single()) {
            Some(close) => (close.with_timezone(&Utc) - now)
                .to_std()
                .unwrap_or(Duration::from_secs(1)),
            None => Duration::from_secs(60),
        }
    }

    fn refresh_lock(&self, portfolio_id: &PortfolioId) -> RefreshLock {
        Arc::clone(self.refresh_locks.lock().entry(portfolio_id.clone()).or_default())
    }

    fn book(&self, portfolio_id: &PortfolioId) -> Result<BookHandle, CoreError> {
        self.books.read().get(portfolio_id).cloned().ok_or_else(|| {
            PortfolioError::NotOpen {
                portfolio_id: portfolio_id.clone(),
            }
            .into()
        })
    }
}

//! Risk Governor Service
//!
//! Owns per-user limits and daily ledgers, runs pre-trade admission, books
//! realized P&L after fills and unrealized P&L after snapshots, and resets
//! the ledgers at local midnight.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{EventPublisherPort, RiskLimitsRepository};
use crate::config::RiskConfig;
use crate::domain::events::{DomainEvent, NotificationSeverity};
use crate::domain::risk_management::{
    AdmissionInput, PositionExposure, RiskAdmission, RiskCandidate, RiskDecision, RiskLedger,
    RiskLimits,
};
use crate::domain::shared::{Money, PortfolioId, UserId};
use crate::error::CoreError;
use crate::observability;

/// Configuration for the risk governor.
#[derive(Debug, Clone, Default)]
pub struct RiskGovernorConfig {
    /// Limits for users without explicit limits.
    pub default_limits: RiskLimits,
    /// UTC offset of the timezone whose midnight starts a trading day.
    pub utc_offset_minutes: i32,
}

impl From<&RiskConfig> for RiskGovernorConfig {
    fn from(config: &RiskConfig) -> Self {
        Self {
            default_limits: config.default_limits.clone(),
            utc_offset_minutes: config.reset_utc_offset_minutes,
        }
    }
}

/// Pre-trade admission and daily loss tracking.
pub struct RiskGovernor {
    default_limits: Arc<RiskLimits>,
    offset: FixedOffset,
    limits: RwLock<HashMap<UserId, Arc<RiskLimits>>>,
    ledgers: RwLock<HashMap<UserId, Arc<Mutex<RiskLedger>>>>,
    repository: Arc<dyn RiskLimitsRepository>,
    events: Arc<dyn EventPublisherPort>,
    reset_task: Mutex<Option<CancellationToken>>,
}

impl RiskGovernor {
    /// Create a new risk governor.
    #[must_use]
    pub fn new(
        config: RiskGovernorConfig,
        repository: Arc<dyn RiskLimitsRepository>,
        events: Arc<dyn EventPublisherPort>,
    ) -> Self {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60).unwrap_or(Utc.fix());
        Self {
            default_limits: Arc::new(config.default_limits),
            offset,
            limits: RwLock::new(HashMap::new()),
            ledgers: RwLock::new(HashMap::new()),
            repository,
            events,
            reset_task: Mutex::new(None),
        }
    }

    // =========================================================================
    // Limits
    // =========================================================================

    /// Load every persisted limit set into the registry.
    ///
    /// # Errors
    ///
    /// Returns error if the repository query fails.
    pub async fn load_limits(&self) -> Result<usize, CoreError> {
        let stored = self.repository.all_limits().await?;
        let count = stored.len();
        let mut registry = self.limits.write();
        for (user_id, limits) in stored {
            registry.insert(user_id, Arc::new(limits));
        }
        tracing::info!(count, "Loaded risk limits");
        Ok(count)
    }

    /// Current limits of a user, falling back to the defaults.
    #[must_use]
    pub fn limits(&self, user_id: &UserId) -> Arc<RiskLimits> {
        self.limits
            .read()
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default_limits))
    }

    /// Replace a user's limits as a whole.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for out-of-range limits and `Persistence` if the
    /// store rejects the write. The registry is untouched on error.
    pub async fn set_limits(&self, user_id: &UserId, limits: RiskLimits) -> Result<(), CoreError> {
        limits.validate()?;
        self.repository.save_limits(user_id, &limits).await?;
        self.limits.write().insert(user_id.clone(), Arc::new(limits));
        tracing::info!(user_id = %user_id, "Risk limits replaced");
        Ok(())
    }

    // =========================================================================
    // Admission
    // =========================================================================

    /// Run pre-trade admission at the current time.
    #[must_use]
    pub fn check_order(
        &self,
        user_id: &UserId,
        candidate: &RiskCandidate,
        positions: &[PositionExposure],
        portfolio_value: Money,
    ) -> RiskDecision {
        self.check_order_at(user_id, candidate, positions, portfolio_value, Utc::now())
    }

    /// Run pre-trade admission at `now`. Reads state, never writes it.
    #[must_use]
    pub fn check_order_at(
        &self,
        user_id: &UserId,
        candidate: &RiskCandidate,
        positions: &[PositionExposure],
        portfolio_value: Money,
        now: DateTime<Utc>,
    ) -> RiskDecision {
        let limits = self.limits(user_id);
        let ledger = self.effective_ledger(user_id, now);

        let decision = RiskAdmission::evaluate(&AdmissionInput {
            limits: &limits,
            ledger: &ledger,
            candidate,
            positions,
            portfolio_value,
            now,
        });

        let check = decision
            .failed_check
            .map_or_else(|| "NONE".to_string(), |c| c.to_string());
        observability::record_risk_decision(decision.allowed, &check);
        if !decision.allowed {
            tracing::info!(
                user_id = %user_id,
                symbol = %candidate.symbol,
                check = %check,
                reason = decision.reason.as_deref().unwrap_or_default(),
                "Order rejected by risk admission"
            );
        }
        decision
    }

    // =========================================================================
    // Ledger
    // =========================================================================

    /// Book the realized P&L of one fill.
    ///
    /// Sets the emergency halt when cumulative daily loss reaches the
    /// user's ceiling and notifies the user once.
    pub async fn record_trade(&self, user_id: &UserId, realized_pnl: Money) -> RiskLedger {
        let limits = self.limits(user_id);
        let today = self.trading_date(Utc::now());
        let handle = self.ledger_handle(user_id, today);

        let (snapshot, newly_halted) = {
            let mut ledger = handle.lock();
            if ledger.trading_date < today {
                ledger.roll_to(today);
            }
            let newly_halted = ledger.record_trade(realized_pnl, limits.max_daily_loss);
            (ledger.clone(), newly_halted)
        };

        if newly_halted {
            self.announce_loss_halt(user_id, &snapshot, &limits).await;
        }
        snapshot
    }

    /// Replace the unrealized P&L of one portfolio's open positions.
    ///
    /// Open drawdown counts toward the daily loss ceiling the same way
    /// realized losses do, so a mark can set the halt.
    pub async fn update_unrealized(
        &self,
        user_id: &UserId,
        portfolio_id: &PortfolioId,
        unrealized_pnl: Money,
    ) -> RiskLedger {
        let limits = self.limits(user_id);
        let today = self.trading_date(Utc::now());
        let handle = self.ledger_handle(user_id, today);

        let (snapshot, newly_halted) = {
            let mut ledger = handle.lock();
            if ledger.trading_date < today {
                ledger.roll_to(today);
            }
            let newly_halted = ledger.mark_unrealized(
                portfolio_id.clone(),
                unrealized_pnl,
                limits.max_daily_loss,
            );
            (ledger.clone(), newly_halted)
        };

        if newly_halted {
            self.announce_loss_halt(user_id, &snapshot, &limits).await;
        }
        snapshot
    }

    /// Set the emergency halt for a user.
    pub async fn emergency_halt(&self, user_id: &UserId, reason: &str) {
        let today = self.trading_date(Utc::now());
        self.ledger_handle(user_id, today).lock().halt(reason);
        observability::record_emergency_halt();
        tracing::warn!(user_id = %user_id, reason, "Emergency halt set");
        self.notify(user_id, NotificationSeverity::Critical, "Trading halted", reason.to_string())
            .await;
    }

    /// Clear the emergency halt for a user.
    pub fn clear_halt(&self, user_id: &UserId) {
        let handle = self.ledgers.read().get(user_id).cloned();
        if let Some(handle) = handle {
            handle.lock().clear_halt();
            tracing::info!(user_id = %user_id, "Emergency halt cleared");
        }
    }

    /// Whether a user is under emergency halt.
    #[must_use]
    pub fn is_halted(&self, user_id: &UserId) -> bool {
        self.ledgers
            .read()
            .get(user_id)
            .is_some_and(|handle| handle.lock().halted)
    }

    /// Copy of a user's ledger as admission would see it now.
    #[must_use]
    pub fn ledger(&self, user_id: &UserId) -> RiskLedger {
        self.effective_ledger(user_id, Utc::now())
    }

    /// Start a new trading day for every ledger whose date is behind `now`.
    /// Halts are kept. Returns how many ledgers were reset.
    pub fn reset_daily(&self, now: DateTime<Utc>) -> usize {
        let today = self.trading_date(now);
        let handles: Vec<_> = self.ledgers.read().values().cloned().collect();

        let mut reset = 0;
        for handle in handles {
            let mut ledger = handle.lock();
            if ledger.trading_date < today {
                ledger.roll_to(today);
                reset += 1;
            }
        }
        tracing::info!(trading_date = %today, reset, "Daily risk ledgers reset");
        reset
    }

    /// Trading day of an instant in the configured timezone.
    #[must_use]
    pub fn trading_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start the midnight reset task. Calling twice is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.reset_task.lock();
        if slot.is_some() {
            return;
        }
        let shutdown = CancellationToken::new();
        *slot = Some(shutdown.clone());
        drop(slot);

        let governor = Arc::clone(self);
        tokio::spawn(async move {
            tracing::info!("Risk ledger reset task started");
            loop {
                let wait = governor.until_next_midnight(Utc::now());
                tokio::select! {
                    () = tokio::time::sleep(wait) => {
                        governor.reset_daily(Utc::now());
                    }
                    () = shutdown.cancelled() => {
                        tracing::info!("Risk ledger reset task shutting down");
                        break;
                    }
                }
            }
        });
    }

    /// Stop the midnight reset task.
    pub fn stop(&self) {
        if let Some(token) = self.reset_task.lock().take() {
            token.cancel();
        }
    }

    fn until_next_midnight(&self, now: DateTime<Utc>) -> Duration {
        let next = self
            .trading_date(now)
            .succ_opt()
            .and_then(|day| day.and_hms_opt(0, 0, 0))
            .and_then(|midnight| midnight.and_local_timezone(self.offset).single());

        match next {
            Some(next) => (next.with_timezone(&Utc) - now)
                .to_std()
                .unwrap_or(Duration::from_secs(1)),
            None => Duration::from_secs(60),
        }
    }

    fn ledger_handle(&self, user_id: &UserId, today: NaiveDate) -> Arc<Mutex<RiskLedger>> {
        if let Some(handle) = self.ledgers.read().get(user_id) {
            return Arc::clone(handle);
        }
        let mut ledgers = self.ledgers.write();
        Arc::clone(
            ledgers
                .entry(user_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(RiskLedger::new(today)))),
        )
    }

    fn effective_ledger(&self, user_id: &UserId, now: DateTime<Utc>) -> RiskLedger {
        let today = self.trading_date(now);
        let stored = self
            .ledgers
            .read()
            .get(user_id)
            .map(|handle| handle.lock().clone());

        match stored {
            Some(mut ledger) => {
                if ledger.trading_date < today {
                    ledger.roll_to(today);
                }
                ledger
            }
            None => RiskLedger::new(today),
        }
    }

    async fn announce_loss_halt(&self, user_id: &UserId, ledger: &RiskLedger, limits: &RiskLimits) {
        observability::record_emergency_halt();
        tracing::error!(
            user_id = %user_id,
            realized_pnl = %ledger.daily_pnl,
            unrealized_pnl = %ledger.unrealized_pnl(),
            max_daily_loss = %limits.max_daily_loss,
            "Daily loss limit reached, trading halted"
        );
        self.notify(
            user_id,
            NotificationSeverity::Critical,
            "Trading halted",
            ledger
                .halt_reason
                .clone()
                .unwrap_or_else(|| "daily loss limit reached".to_string()),
        )
        .await;
    }

    async fn notify(
        &self,
        user_id: &UserId,
        severity: NotificationSeverity,
        title: &str,
        message: String,
    ) {
        let event = DomainEvent::UserNotification {
            user_id: user_id.clone(),
            severity,
            title: title.to_string(),
            message,
        };
        if let Err(e) = self.events.publish(event).await {
            tracing::warn!(error = %e, user_id = %user_id, "Failed to publish notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order_execution::OrderSide;
    use crate::domain::risk_management::RiskCheck;
    use crate::domain::shared::{Quantity, Symbol};
    use crate::infrastructure::events::RecordingEventPublisher;
    use crate::infrastructure::persistence::InMemoryRiskLimitsRepository;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn governor() -> (RiskGovernor, Arc<RecordingEventPublisher>) {
        let events = Arc::new(RecordingEventPublisher::new());
        let governor = RiskGovernor::new(
            RiskGovernorConfig::default(),
            Arc::new(InMemoryRiskLimitsRepository::new()),
            events.clone(),
        );
        (governor, events)
    }

    fn candidate(quantity: i64, price: i64) -> RiskCandidate {
        RiskCandidate {
            symbol: Symbol::new("AAPL"),
            side: OrderSide::Buy,
            quantity: Quantity::from_i64(quantity),
            reference_price: Money::from_i64(price),
            stop_price: None,
        }
    }

    #[tokio::test]
    async fn defaults_apply_until_limits_are_set() {
        let (governor, _) = governor();
        let user = UserId::new("u-1");
        assert_eq!(*governor.limits(&user), RiskLimits::default());

        let limits = RiskLimits {
            max_order_notional: Money::from_i64(10_000),
            ..RiskLimits::default()
        };
        governor.set_limits(&user, limits.clone()).await.unwrap();
        assert_eq!(*governor.limits(&user), limits);
    }

    #[tokio::test]
    async fn invalid_limits_leave_registry_untouched() {
        let (governor, _) = governor();
        let user = UserId::new("u-1");
        let bad = RiskLimits {
            max_daily_loss: Money::ZERO,
            ..RiskLimits::default()
        };

        let err = governor.set_limits(&user, bad).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(*governor.limits(&user), RiskLimits::default());
    }

    #[tokio::test]
    async fn oversized_order_gets_suggestion() {
        let (governor, _) = governor();
        let user = UserId::new("u-1");
        governor
            .set_limits(
                &user,
                RiskLimits {
                    max_order_notional: Money::from_i64(10_000),
                    ..RiskLimits::default()
                },
            )
            .await
            .unwrap();

        let decision =
            governor.check_order(&user, &candidate(1_000, 50), &[], Money::from_i64(1_000_000));
        assert!(!decision.allowed);
        assert_eq!(decision.failed_check, Some(RiskCheck::OrderNotional));
        assert_eq!(decision.suggested_quantity, Some(Quantity::from_i64(200)));
    }

    #[tokio::test]
    async fn loss_ceiling_halts_once_and_notifies() {
        let (governor, events) = governor();
        let user = UserId::new("u-1");
        governor
            .set_limits(
                &user,
                RiskLimits {
                    max_daily_loss: Money::from_i64(100),
                    ..RiskLimits::default()
                },
            )
            .await
            .unwrap();

        governor.record_trade(&user, Money::from_i64(-60)).await;
        assert!(!governor.is_halted(&user));
        let ledger = governor.record_trade(&user, Money::from_i64(-40)).await;
        assert!(ledger.halted);
        governor.record_trade(&user, Money::from_i64(-5)).await;

        assert!(governor.is_halted(&user));
        assert_eq!(governor.ledger(&user).trade_count, 3);
        assert_eq!(events.count_of("USER_NOTIFICATION"), 1);

        let decision =
            governor.check_order(&user, &candidate(1, 10), &[], Money::from_i64(100_000));
        assert_eq!(decision.failed_check, Some(RiskCheck::EmergencyHalt));
    }

    #[tokio::test]
    async fn open_drawdown_halts_and_blocks_admission() {
        let (governor, events) = governor();
        let user = UserId::new("u-1");
        let portfolio = PortfolioId::new("p-1");
        governor
            .set_limits(
                &user,
                RiskLimits {
                    max_daily_loss: Money::from_i64(100),
                    ..RiskLimits::default()
                },
            )
            .await
            .unwrap();

        governor.record_trade(&user, Money::from_i64(-20)).await;
        let ledger = governor
            .update_unrealized(&user, &portfolio, Money::from_i64(-50))
            .await;
        assert_eq!(ledger.total_pnl(), Money::from_i64(-70));
        assert!(!ledger.halted);

        // 10 at 100 with a 2% default stop risks 20; -70 - 20 stays inside.
        let decision =
            governor.check_order(&user, &candidate(10, 100), &[], Money::from_i64(100_000));
        assert!(decision.allowed);

        governor
            .update_unrealized(&user, &portfolio, Money::from_i64(-70))
            .await;
        let decision =
            governor.check_order(&user, &candidate(10, 100), &[], Money::from_i64(100_000));
        assert_eq!(decision.failed_check, Some(RiskCheck::DailyLoss));

        governor
            .update_unrealized(&user, &portfolio, Money::from_i64(-80))
            .await;
        assert!(governor.is_halted(&user));
        assert_eq!(events.count_of("USER_NOTIFICATION"), 1);
        assert_eq!(governor.ledger(&user).trade_count, 1);
    }

    #[tokio::test]
    async fn halt_survives_daily_reset_until_cleared() {
        let (governor, _) = governor();
        let user = UserId::new("u-1");
        governor.record_trade(&user, Money::from_i64(25)).await;
        governor.emergency_halt(&user, "manual").await;

        let tomorrow = Utc::now() + chrono::Duration::days(1);
        assert_eq!(governor.reset_daily(tomorrow), 1);

        let ledger = governor.effective_ledger(&user, tomorrow);
        assert!(ledger.halted);
        assert_eq!(ledger.trade_count, 0);
        assert_eq!(ledger.daily_pnl, Money::ZERO);

        governor.clear_halt(&user);
        assert!(!governor.is_halted(&user));
    }

    #[tokio::test]
    async fn admission_does_not_create_ledgers() {
        let (governor, _) = governor();
        let user = UserId::new("u-1");
        let first = governor.check_order(&user, &candidate(10, 10), &[], Money::from_i64(100_000));
        let second = governor.check_order(&user, &candidate(10, 10), &[], Money::from_i64(100_000));

        assert_eq!(first, second);
        assert!(governor.ledgers.read().is_empty());
    }

    #[test]
    fn trading_date_honours_offset() {
        let governor = RiskGovernor::new(
            RiskGovernorConfig {
                default_limits: RiskLimits::default(),
                utc_offset_minutes: -300,
            },
            Arc::new(InMemoryRiskLimitsRepository::new()),
            Arc::new(RecordingEventPublisher::new()),
        );
        let late_utc = Utc.with_ymd_and_hms(2026, 3, 10, 3, 0, 0).unwrap();
        assert_eq!(
            governor.trading_date(late_utc),
            NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()
        );
        assert_eq!(
            governor.until_next_midnight(late_utc),
            Duration::from_secs(2 * 3600)
        );
    }

    #[tokio::test]
    async fn load_limits_reads_repository() {
        let repository = Arc::new(InMemoryRiskLimitsRepository::new());
        let user = UserId::new("u-9");
        let limits = RiskLimits {
            max_portfolio_risk_fraction: dec!(0.5),
            ..RiskLimits::default()
        };
        repository.save_limits(&user, &limits).await.unwrap();

        let governor = RiskGovernor::new(
            RiskGovernorConfig::default(),
            repository,
            Arc::new(RecordingEventPublisher::new()),
        );
        assert_eq!(governor.load_limits().await.unwrap(), 1);
        assert_eq!(*governor.limits(&user), limits);
    }
}

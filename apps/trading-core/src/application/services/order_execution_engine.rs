//! Order Execution Engine Service
//!
//! Owns the order registry. Submission runs validation and risk admission
//! before the broker sees the order; executions arrive through the
//! execution report channel and are applied to the order and the position
//! tracker as one step.
//!
//! Lock order is always order, then portfolio book. Every broker call runs
//! under the configured timeout while the order lock is held.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{PositionTracker, RiskGovernor};
use crate::application::ports::{
    BrokerError, BrokerPort, ConnectionStatusPort, EventPublisherPort, ExecutionOutcome,
    ExecutionReport, ExecutionReportReceiver, FillQuantity, MarketDataPort, SubmitOrderRequest,
};
use crate::config::ExecutionConfig;
use crate::domain::events::DomainEvent;
use crate::domain::order_execution::{
    ExecutionPricing, FeeSchedule, Fill, Order, OrderRepository, OrderRequest, OrderStatus,
    TimeInForce,
};
use crate::domain::risk_management::{RiskCandidate, RiskCheck};
use crate::domain::shared::{
    BrokerOrderId, ConnectionId, FillId, Money, OrderId, Quantity, Timestamp, UserId,
};
use crate::error::CoreError;
use crate::observability;

/// Configuration for the execution engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Initial state of the live trading switch.
    pub live_trading_enabled: bool,
    /// Commission and fee model.
    pub fees: FeeSchedule,
    /// Time a broker submit or cancel may take before it counts as failed.
    pub broker_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&ExecutionConfig::default())
    }
}

impl From<&ExecutionConfig> for EngineConfig {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            live_trading_enabled: config.live_trading_enabled,
            fees: config.fees.to_fee_schedule(),
            broker_timeout: config.broker_timeout(),
        }
    }
}

/// Result of an emergency stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyStopResult {
    /// Orders cancelled.
    pub cancelled_count: usize,
    /// Orders whose cancel failed.
    pub failed_count: usize,
    /// Orders already terminal.
    pub unaffected_count: usize,
    /// Ids of cancelled orders.
    pub cancelled_order_ids: Vec<OrderId>,
    /// Ids of orders whose cancel failed.
    pub failed_order_ids: Vec<OrderId>,
    /// When the stop finished.
    pub completed_at: Timestamp,
}

type OrderHandle = Arc<Mutex<Order>>;

/// Order lifecycle owner.
pub struct OrderExecutionEngine {
    fees: FeeSchedule,
    broker_timeout: Duration,
    live_trading: AtomicBool,
    orders: RwLock<HashMap<OrderId, OrderHandle>>,
    broker: Arc<dyn BrokerPort>,
    market_data: Arc<dyn MarketDataPort>,
    order_repository: Arc<dyn OrderRepository>,
    events: Arc<dyn EventPublisherPort>,
    risk: Arc<RiskGovernor>,
    tracker: Arc<PositionTracker>,
    connection: Option<(ConnectionId, Arc<dyn ConnectionStatusPort>)>,
}

impl OrderExecutionEngine {
    /// Create a new engine.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        broker: Arc<dyn BrokerPort>,
        market_data: Arc<dyn MarketDataPort>,
        order_repository: Arc<dyn OrderRepository>,
        events: Arc<dyn EventPublisherPort>,
        risk: Arc<RiskGovernor>,
        tracker: Arc<PositionTracker>,
    ) -> Self {
        Self {
            fees: config.fees,
            broker_timeout: config.broker_timeout,
            live_trading: AtomicBool::new(config.live_trading_enabled),
            orders: RwLock::new(HashMap::new()),
            broker,
            market_data,
            order_repository,
            events,
            risk,
            tracker,
            connection: None,
        }
    }

    /// Refuse submissions while the broker connection is deactivated.
    #[must_use]
    pub fn with_connection_status(
        mut self,
        connection_id: ConnectionId,
        status: Arc<dyn ConnectionStatusPort>,
    ) -> Self {
        self.connection = Some((connection_id, status));
        self
    }

    /// Flip the live trading switch.
    pub fn set_live_trading(&self, enabled: bool) {
        self.live_trading.store(enabled, Ordering::SeqCst);
        tracing::warn!(enabled, "Live trading switch changed");
    }

    /// Whether submissions are accepted.
    #[must_use]
    pub fn is_live_trading(&self) -> bool {
        self.live_trading.load(Ordering::SeqCst)
    }

    /// Reload non-terminal orders from the store into the registry.
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the store query fails.
    pub async fn restore_open_orders(&self) -> Result<usize, CoreError> {
        let active = self.order_repository.find_active().await?;
        let count = active.len();
        let mut orders = self.orders.write();
        for order in active {
            orders
                .entry(order.id().clone())
                .or_insert_with(|| Arc::new(Mutex::new(order)));
        }
        tracing::info!(count, "Restored open orders");
        Ok(count)
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Validate, admit and submit an order.
    ///
    /// # Errors
    ///
    /// - `TradingDisabled` when the live trading switch is off
    /// - `Connectivity` when the broker connection was deactivated
    /// - `Validation` for malformed requests or a symbol without any price
    /// - `NotFound` / `Forbidden` for an unknown or foreign portfolio
    /// - `RiskRejection` when admission refuses the order
    /// - a broker error kind when submission fails; the order is then
    ///   stored as `Rejected` and never retried
    pub async fn submit_order(&self, request: OrderRequest) -> Result<Order, CoreError> {
        if !self.is_live_trading() {
            observability::record_order_rejection("disabled");
            return Err(CoreError::TradingDisabled);
        }
        if let Some((connection_id, status)) = &self.connection {
            if status.is_deactivated(connection_id) {
                observability::record_order_rejection("connection");
                return Err(CoreError::Connectivity(format!(
                    "broker connection {connection_id} is deactivated"
                )));
            }
        }

        let order = Order::new(request).map_err(|e| {
            observability::record_order_rejection("validation");
            CoreError::from(e)
        })?;

        let view = self.tracker.risk_view(order.portfolio_id()).await?;
        if &view.user_id != order.user_id() {
            return Err(CoreError::Forbidden(format!(
                "portfolio {} is not owned by {}",
                order.portfolio_id(),
                order.user_id()
            )));
        }

        let reference_price = self.admission_price(&order).await?;
        let candidate = RiskCandidate {
            symbol: order.symbol().clone(),
            side: order.side(),
            quantity: order.quantity(),
            reference_price,
            stop_price: order.stop_price(),
        };
        let decision = self.risk.check_order(
            order.user_id(),
            &candidate,
            &view.positions,
            view.portfolio_value,
        );
        if !decision.allowed {
            observability::record_order_rejection("risk");
            return Err(CoreError::RiskRejection {
                check: decision.failed_check.unwrap_or(RiskCheck::EmergencyHalt),
                reason: decision.reason.unwrap_or_default(),
                suggested_quantity: decision.suggested_quantity,
            });
        }

        self.order_repository.save(&order).await?;
        let order_id = order.id().clone();
        let handle = Arc::new(Mutex::new(order));
        self.orders.write().insert(order_id, Arc::clone(&handle));

        let mut order = handle.lock().await;
        let started = Instant::now();
        let request = SubmitOrderRequest::from(&*order);
        match self.with_timeout(self.broker.submit_order(request)).await {
            Ok(broker_order_id) => {
                order.mark_submitted(broker_order_id)?;
                self.persist(&order).await;
                observability::record_order_submission(
                    &order.order_type().to_string(),
                    started.elapsed().as_secs_f64(),
                );
                tracing::info!(
                    order_id = %order.id(),
                    user_id = %order.user_id(),
                    symbol = %order.symbol(),
                    side = %order.side(),
                    quantity = %order.quantity(),
                    risk_score = decision.risk_score,
                    "Order submitted"
                );
                let submitted = order.clone();
                drop(order);
                self.publish(DomainEvent::OrderSubmitted {
                    order: submitted.clone(),
                })
                .await;
                Ok(submitted)
            }
            Err(e) => {
                let reason = e.to_string();
                order.reject(reason.clone())?;
                self.persist(&order).await;
                observability::record_order_rejection("broker");
                tracing::warn!(order_id = %order.id(), error = %e, "Broker refused order");
                let rejected = order.clone();
                drop(order);
                self.publish(DomainEvent::OrderRejected {
                    order: rejected,
                    reason,
                })
                .await;
                Err(e.into())
            }
        }
    }

    // =========================================================================
    // Cancellation
    // =========================================================================

    /// Cancel an order on behalf of its owner.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown orders, `Forbidden` for another user's
    /// order, `StateConflict` for terminal orders, and the broker's error
    /// kind when the broker refuses; the order is unchanged on error.
    pub async fn cancel_order(
        &self,
        order_id: &OrderId,
        user_id: &UserId,
    ) -> Result<Order, CoreError> {
        let handle = self.handle(order_id)?;
        let mut order = handle.lock().await;
        if order.user_id() != user_id {
            return Err(CoreError::Forbidden(format!(
                "order {order_id} is not owned by {user_id}"
            )));
        }
        self.cancel_locked(&mut order, "cancelled by user").await?;
        let cancelled = order.clone();
        drop(order);

        self.publish(DomainEvent::OrderCancelled {
            order: cancelled.clone(),
        })
        .await;
        Ok(cancelled)
    }

    /// Cancel every open order of a user, best effort. Does not halt the
    /// user; pair with `RiskGovernor::emergency_halt` for that.
    pub async fn emergency_stop(&self, user_id: &UserId, reason: &str) -> EmergencyStopResult {
        tracing::warn!(user_id = %user_id, reason, "Emergency stop requested");

        let handles: Vec<OrderHandle> = self.orders.read().values().cloned().collect();
        let mut cancelled_order_ids = Vec::new();
        let mut failed_order_ids = Vec::new();
        let mut unaffected_count = 0;
        let mut cancelled_orders = Vec::new();

        for handle in handles {
            let mut order = handle.lock().await;
            if order.user_id() != user_id {
                continue;
            }
            if order.is_terminal() {
                unaffected_count += 1;
                continue;
            }

            match self.cancel_locked(&mut order, reason).await {
                Ok(()) => {
                    cancelled_order_ids.push(order.id().clone());
                    cancelled_orders.push(order.clone());
                }
                Err(e) => {
                    tracing::warn!(order_id = %order.id(), error = %e, "Emergency cancel failed");
                    failed_order_ids.push(order.id().clone());
                }
            }
        }

        for order in cancelled_orders {
            self.publish(DomainEvent::OrderCancelled { order }).await;
        }

        let result = EmergencyStopResult {
            cancelled_count: cancelled_order_ids.len(),
            failed_count: failed_order_ids.len(),
            unaffected_count,
            cancelled_order_ids,
            failed_order_ids,
            completed_at: Timestamp::now(),
        };

        tracing::warn!(
            user_id = %user_id,
            cancelled = result.cancelled_count,
            failed = result.failed_count,
            unaffected = result.unaffected_count,
            "Emergency stop completed"
        );
        self.publish(DomainEvent::EmergencyStop {
            user_id: user_id.clone(),
            reason: reason.to_string(),
            cancelled_count: result.cancelled_count,
            failed_count: result.failed_count,
        })
        .await;
        result
    }

    async fn cancel_locked(&self, order: &mut Order, reason: &str) -> Result<(), CoreError> {
        if order.is_terminal() {
            return Err(CoreError::StateConflict(format!(
                "order {} is already {}",
                order.id(),
                order.status()
            )));
        }
        if let Some(broker_order_id) = order.broker_order_id() {
            self.with_timeout(self.broker.cancel_order(broker_order_id))
                .await?;
        }
        order.cancel(reason)?;
        self.persist(order).await;
        observability::record_order_cancel(reason);
        tracing::info!(order_id = %order.id(), reason, "Order cancelled");
        Ok(())
    }

    // =========================================================================
    // Executions
    // =========================================================================

    /// Consume execution reports in arrival order until the channel closes
    /// or `shutdown` fires.
    pub async fn run_execution_reports(
        &self,
        mut reports: ExecutionReportReceiver,
        shutdown: CancellationToken,
    ) {
        tracing::info!("Execution report consumer started");
        loop {
            tokio::select! {
                report = reports.recv() => {
                    match report {
                        Some(report) => {
                            self.handle_execution_report(report).await;
                        }
                        None => {
                            tracing::info!("Execution report channel closed");
                            break;
                        }
                    }
                }
                () = shutdown.cancelled() => {
                    tracing::info!("Execution report consumer shutting down");
                    break;
                }
            }
        }
    }

    /// Apply one execution report and answer its responder.
    pub async fn handle_execution_report(&self, report: ExecutionReport) -> ExecutionOutcome {
        let ExecutionReport {
            order_id,
            broker_order_id,
            quantity,
            price,
            broker_trade_id,
            responder,
        } = report;

        let outcome = self
            .apply_execution(&order_id, &broker_order_id, quantity, price, broker_trade_id)
            .await;

        if let Some(responder) = responder {
            // The producer may have given up waiting.
            let _ = responder.send(outcome.clone());
        }
        outcome
    }

    async fn apply_execution(
        &self,
        order_id: &OrderId,
        broker_order_id: &BrokerOrderId,
        quantity: FillQuantity,
        price: Option<Money>,
        broker_trade_id: Option<String>,
    ) -> ExecutionOutcome {
        let Ok(handle) = self.handle(order_id) else {
            return ignored(format!("unknown order {order_id}"));
        };
        let mut order = handle.lock().await;

        if order.broker_order_id() != Some(broker_order_id) {
            return ignored(format!("broker id {broker_order_id} does not match order"));
        }
        if !order.status().can_fill() {
            return ignored(format!("order is {}", order.status()));
        }

        let execution_price = match price {
            Some(price) => Some(price),
            None => match self.market_data.reference_price(order.symbol()).await {
                Some(reference) => ExecutionPricing::execution_price(&order, reference),
                None => None,
            },
        };
        let Some(execution_price) = execution_price else {
            if order.time_in_force().is_immediate() {
                return self.expire_immediate(&mut order).await;
            }
            return ExecutionOutcome::NotTriggered;
        };

        let fill_quantity = Self::fill_quantity(&order, quantity);
        let costs = self.fees.calculate(order.side(), fill_quantity, execution_price);
        let fill = Fill {
            id: FillId::generate(),
            order_id: order.id().clone(),
            symbol: order.symbol().clone(),
            side: order.side(),
            quantity: fill_quantity,
            price: execution_price,
            fees: costs.fees,
            commission: costs.commission,
            broker_trade_id,
            executed_at: Timestamp::now(),
        };

        // Order and position change together or not at all.
        let mut updated = order.clone();
        if let Err(e) = updated.apply_fill(fill.clone()) {
            tracing::warn!(order_id = %order_id, error = %e, "Execution rejected by order");
            return ignored(e.to_string());
        }
        let application = match self
            .tracker
            .apply_fill(&fill, order.user_id(), order.portfolio_id())
            .await
        {
            Ok(application) => application,
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "Execution could not be booked");
                return ignored(e.to_string());
            }
        };
        *order = updated;

        let mut cancelled = false;
        if order.time_in_force() == TimeInForce::Ioc && !order.is_terminal() {
            cancelled = self.cancel_ioc_remainder(&mut order).await;
        }
        self.persist(&order).await;

        self.risk
            .record_trade(order.user_id(), application.realized_pnl)
            .await;

        let status = order.status();
        let filled = order.filled_quantity();
        observability::record_order_fill(
            &order.order_type().to_string(),
            status == OrderStatus::Filled,
        );
        tracing::info!(
            order_id = %order_id,
            fill_quantity = %fill.quantity,
            price = %fill.price,
            filled = %filled,
            status = %status,
            realized_pnl = %application.realized_pnl,
            "Execution applied"
        );

        let snapshot = order.clone();
        let portfolio_id = order.portfolio_id().clone();
        drop(order);

        let mut events = vec![
            DomainEvent::OrderFilled {
                order: snapshot.clone(),
                fill,
            },
            DomainEvent::PositionUpdated {
                position: application.position,
            },
        ];
        if cancelled {
            events.push(DomainEvent::OrderCancelled { order: snapshot });
        }
        if let Err(e) = self.events.publish_all(events).await {
            tracing::warn!(error = %e, order_id = %order_id, "Failed to publish execution events");
        }
        self.tracker.refresh_if_tracked(&portfolio_id).await;

        ExecutionOutcome::Applied { status, filled }
    }

    /// Quantity an execution fills. Fill-or-kill always takes the whole
    /// remainder; partial ratios round down to whole shares, and a ratio that
    /// rounds to nothing takes the remainder.
    fn fill_quantity(order: &Order, instruction: FillQuantity) -> Quantity {
        let leaves = order.leaves_quantity();
        if order.time_in_force() == TimeInForce::Fok {
            return leaves;
        }
        let requested = match instruction {
            FillQuantity::Full => leaves,
            FillQuantity::Partial(ratio) => {
                let ratio = ratio.clamp(Decimal::ZERO, Decimal::ONE);
                (leaves * ratio).floor()
            }
            FillQuantity::Exact(quantity) => quantity,
        };
        if requested.is_positive() {
            requested.min(leaves)
        } else {
            leaves
        }
    }

    async fn cancel_ioc_remainder(&self, order: &mut Order) -> bool {
        if let Some(broker_order_id) = order.broker_order_id() {
            if let Err(e) = self.with_timeout(self.broker.cancel_order(broker_order_id)).await {
                tracing::warn!(order_id = %order.id(), error = %e, "Broker cancel of IOC remainder failed");
            }
        }
        match order.cancel("immediate-or-cancel remainder") {
            Ok(()) => {
                observability::record_order_cancel("ioc");
                true
            }
            Err(e) => {
                tracing::warn!(order_id = %order.id(), error = %e, "Could not cancel IOC remainder");
                false
            }
        }
    }

    async fn expire_immediate(&self, order: &mut Order) -> ExecutionOutcome {
        let tif = order.time_in_force();
        if let Some(broker_order_id) = order.broker_order_id() {
            if let Err(e) = self.with_timeout(self.broker.cancel_order(broker_order_id)).await {
                tracing::warn!(order_id = %order.id(), error = %e, "Broker cancel of expired order failed");
            }
        }
        if let Err(e) = order.cancel(format!("{tif} order not marketable")) {
            return ignored(e.to_string());
        }
        self.persist(order).await;
        observability::record_order_cancel("expired");
        self.publish(DomainEvent::OrderCancelled {
            order: order.clone(),
        })
        .await;
        ignored(format!("{tif} order not marketable, cancelled"))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// One order.
    pub async fn order(&self, order_id: &OrderId) -> Option<Order> {
        let handle = self.handle(order_id).ok()?;
        let order = handle.lock().await;
        Some(order.clone())
    }

    /// Every order of a user, oldest first.
    pub async fn orders_for_user(&self, user_id: &UserId) -> Vec<Order> {
        let handles: Vec<OrderHandle> = self.orders.read().values().cloned().collect();
        let mut orders = Vec::new();
        for handle in handles {
            let order = handle.lock().await;
            if order.user_id() == user_id {
                orders.push(order.clone());
            }
        }
        orders.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        orders
    }

    /// Non-terminal orders of a user, oldest first.
    pub async fn open_orders(&self, user_id: &UserId) -> Vec<Order> {
        let mut orders = self.orders_for_user(user_id).await;
        orders.retain(|o| !o.is_terminal());
        orders
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Price used for admission: the reference price, else the order's own
    /// limit or stop.
    async fn admission_price(&self, order: &Order) -> Result<Money, CoreError> {
        if let Some(price) = self.market_data.reference_price(order.symbol()).await {
            return Ok(price);
        }
        order
            .limit_price()
            .or_else(|| order.stop_price())
            .ok_or_else(|| {
                observability::record_order_rejection("validation");
                CoreError::Validation(format!("no reference price for {}", order.symbol()))
            })
    }

    async fn with_timeout<T>(
        &self,
        call: impl Future<Output = Result<T, BrokerError>>,
    ) -> Result<T, BrokerError> {
        match tokio::time::timeout(self.broker_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Timeout {
                after_ms: u64::try_from(self.broker_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    fn handle(&self, order_id: &OrderId) -> Result<OrderHandle, CoreError> {
        self.orders
            .read()
            .get(order_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("order", order_id))
    }

    async fn persist(&self, order: &Order) {
        if let Err(e) = self.order_repository.save(order).await {
            tracing::error!(order_id = %order.id(), error = %e, "Failed to persist order");
        }
    }

    async fn publish(&self, event: DomainEvent) {
        let event_type = event.event_type();
        if let Err(e) = self.events.publish(event).await {
            tracing::warn!(error = %e, event_type, "Failed to publish event");
        }
    }
}

fn ignored(reason: String) -> ExecutionOutcome {
    ExecutionOutcome::Ignored { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{AccountBalances, MockBrokerPort, execution_channel};
    use crate::application::services::{RiskGovernorConfig, TrackerConfig};
    use crate::domain::order_execution::{OrderSide, OrderType};
    use crate::domain::portfolio::{Position, PositionRepository};
    use crate::domain::risk_management::RiskLimits;
    use crate::domain::shared::{PersistenceError, PortfolioId, Symbol};
    use crate::infrastructure::events::RecordingEventPublisher;
    use crate::infrastructure::market_data::InMemoryMarketData;
    use crate::infrastructure::persistence::{
        InMemoryOrderRepository, InMemoryPerformanceRepository, InMemoryPositionRepository,
        InMemoryRiskLimitsRepository,
    };
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicUsize;

    struct Harness {
        engine: OrderExecutionEngine,
        risk: Arc<RiskGovernor>,
        tracker: Arc<PositionTracker>,
        prices: Arc<InMemoryMarketData>,
        events: Arc<RecordingEventPublisher>,
        user: UserId,
        portfolio: PortfolioId,
    }

    fn accepting_broker() -> MockBrokerPort {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut broker = MockBrokerPort::new();
        broker.expect_submit_order().returning(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(BrokerOrderId::new(format!("b-{n}")))
        });
        broker.expect_cancel_order().returning(|_| Ok(()));
        broker
    }

    async fn harness_with(broker: MockBrokerPort, fees: FeeSchedule) -> Harness {
        harness_on(
            Arc::new(broker),
            Arc::new(InMemoryPositionRepository::new()),
            fees,
        )
        .await
    }

    async fn harness_on(
        broker: Arc<dyn BrokerPort>,
        positions: Arc<dyn PositionRepository>,
        fees: FeeSchedule,
    ) -> Harness {
        let events = Arc::new(RecordingEventPublisher::new());
        let prices = Arc::new(InMemoryMarketData::new());
        prices.set_price("AAPL", Money::from_i64(100));
        let risk = Arc::new(RiskGovernor::new(
            RiskGovernorConfig::default(),
            Arc::new(InMemoryRiskLimitsRepository::new()),
            events.clone(),
        ));
        let tracker = Arc::new(PositionTracker::new(
            TrackerConfig::default(),
            prices.clone(),
            positions,
            Arc::new(InMemoryPerformanceRepository::new()),
            events.clone(),
        ));
        let user = UserId::new("u-1");
        let portfolio = PortfolioId::new("p-1");
        tracker
            .open_portfolio(&portfolio, &user, Money::from_i64(100_000))
            .await
            .unwrap();
        let engine = OrderExecutionEngine::new(
            EngineConfig {
                live_trading_enabled: true,
                fees,
                broker_timeout: Duration::from_secs(30),
            },
            broker,
            prices.clone(),
            Arc::new(InMemoryOrderRepository::new()),
            events.clone(),
            risk.clone(),
            tracker.clone(),
        );
        Harness {
            engine,
            risk,
            tracker,
            prices,
            events,
            user,
            portfolio,
        }
    }

    async fn harness() -> Harness {
        harness_with(accepting_broker(), FeeSchedule::free()).await
    }

    impl Harness {
        fn market(&self, side: OrderSide, quantity: i64) -> OrderRequest {
            OrderRequest::market(
                self.user.clone(),
                self.portfolio.clone(),
                "AAPL",
                side,
                Quantity::from_i64(quantity),
            )
        }

        async fn execute(&self, order: &Order, quantity: FillQuantity) -> ExecutionOutcome {
            self.engine
                .handle_execution_report(ExecutionReport {
                    order_id: order.id().clone(),
                    broker_order_id: order.broker_order_id().cloned().unwrap(),
                    quantity,
                    price: None,
                    broker_trade_id: None,
                    responder: None,
                })
                .await
        }
    }

    #[tokio::test]
    async fn submit_marks_order_submitted() {
        let h = harness().await;
        let order = h
            .engine
            .submit_order(h.market(OrderSide::Buy, 10))
            .await
            .unwrap();

        assert_eq!(order.status(), OrderStatus::Submitted);
        assert!(order.broker_order_id().is_some());
        assert_eq!(h.events.count_of("ORDER_SUBMITTED"), 1);
        assert_eq!(h.engine.open_orders(&h.user).await.len(), 1);
    }

    #[tokio::test]
    async fn disabled_trading_refuses_everything() {
        let h = harness().await;
        h.engine.set_live_trading(false);
        let err = h
            .engine
            .submit_order(h.market(OrderSide::Buy, 1))
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::TradingDisabled);
        assert!(h.engine.orders_for_user(&h.user).await.is_empty());
    }

    #[tokio::test]
    async fn invalid_request_is_a_validation_error() {
        let h = harness().await;
        let mut request = h.market(OrderSide::Buy, 1);
        request.order_type = OrderType::Limit;

        let err = h.engine.submit_order(request).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn risk_rejection_carries_suggestion() {
        let h = harness().await;
        h.risk
            .set_limits(
                &h.user,
                RiskLimits {
                    max_order_notional: Money::from_i64(10_000),
                    ..RiskLimits::default()
                },
            )
            .await
            .unwrap();
        h.prices.set_price("AAPL", Money::from_i64(50));

        let err = h
            .engine
            .submit_order(h.market(OrderSide::Buy, 1_000))
            .await
            .unwrap_err();
        match err {
            CoreError::RiskRejection {
                check,
                suggested_quantity,
                ..
            } => {
                assert_eq!(check, RiskCheck::OrderNotional);
                assert_eq!(suggested_quantity, Some(Quantity::from_i64(200)));
            }
            other => panic!("expected risk rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn broker_failure_rejects_order_without_retry() {
        let mut broker = MockBrokerPort::new();
        broker.expect_submit_order().times(1).returning(|_| {
            Err(BrokerError::Connectivity {
                message: "connection reset".into(),
            })
        });
        let h = harness_with(broker, FeeSchedule::free()).await;

        let err = h
            .engine
            .submit_order(h.market(OrderSide::Buy, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Connectivity(_)));

        let orders = h.engine.orders_for_user(&h.user).await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status(), OrderStatus::Rejected);
        assert_eq!(h.events.count_of("ORDER_REJECTED"), 1);
    }

    #[tokio::test]
    async fn partial_then_full_execution_tracks_vwap() {
        let h = harness().await;
        let order = h
            .engine
            .submit_order(h.market(OrderSide::Buy, 10))
            .await
            .unwrap();

        let first = h.execute(&order, FillQuantity::Partial(dec!(0.4))).await;
        assert_eq!(
            first,
            ExecutionOutcome::Applied {
                status: OrderStatus::PartiallyFilled,
                filled: Quantity::from_i64(4),
            }
        );

        h.prices.set_price("AAPL", Money::from_i64(110));
        let second = h.execute(&order, FillQuantity::Full).await;
        assert!(second.is_final());

        let stored = h.engine.order(order.id()).await.unwrap();
        assert_eq!(stored.filled_quantity(), Quantity::from_i64(10));
        assert_eq!(stored.avg_fill_price(), Money::from_i64(106));
        assert_eq!(stored.fills().len(), 2);

        let position = h
            .tracker
            .position(&h.portfolio, &"AAPL".into())
            .await
            .unwrap();
        assert_eq!(position.quantity, Quantity::from_i64(10));
        assert_eq!(h.risk.ledger(&h.user).trade_count, 2);
    }

    #[tokio::test]
    async fn limit_order_waits_for_cross() {
        let h = harness().await;
        let request = OrderRequest::limit(
            h.user.clone(),
            h.portfolio.clone(),
            "AAPL",
            OrderSide::Buy,
            Quantity::from_i64(5),
            Money::from_i64(95),
        );
        let order = h.engine.submit_order(request).await.unwrap();

        assert_eq!(
            h.execute(&order, FillQuantity::Full).await,
            ExecutionOutcome::NotTriggered
        );
        h.prices.set_price("AAPL", Money::from_i64(94));
        let outcome = h.execute(&order, FillQuantity::Full).await;
        assert!(matches!(
            outcome,
            ExecutionOutcome::Applied {
                status: OrderStatus::Filled,
                ..
            }
        ));
        let stored = h.engine.order(order.id()).await.unwrap();
        assert_eq!(stored.avg_fill_price(), Money::from_i64(94));
    }

    #[tokio::test]
    async fn fill_or_kill_never_partially_fills() {
        let h = harness().await;
        let request = h
            .market(OrderSide::Buy, 10)
            .with_time_in_force(TimeInForce::Fok);
        let order = h.engine.submit_order(request).await.unwrap();

        let outcome = h.execute(&order, FillQuantity::Partial(dec!(0.3))).await;
        assert_eq!(
            outcome,
            ExecutionOutcome::Applied {
                status: OrderStatus::Filled,
                filled: Quantity::from_i64(10),
            }
        );
    }

    #[tokio::test]
    async fn immediate_or_cancel_drops_remainder() {
        let h = harness().await;
        let request = h
            .market(OrderSide::Buy, 10)
            .with_time_in_force(TimeInForce::Ioc);
        let order = h.engine.submit_order(request).await.unwrap();

        let outcome = h.execute(&order, FillQuantity::Partial(dec!(0.5))).await;
        assert_eq!(
            outcome,
            ExecutionOutcome::Applied {
                status: OrderStatus::Cancelled,
                filled: Quantity::from_i64(5),
            }
        );
        assert_eq!(h.events.count_of("ORDER_CANCELLED"), 1);
    }

    #[tokio::test]
    async fn fees_accrue_and_reduce_cash() {
        let fees = FeeSchedule {
            per_share_commission: dec!(0.005),
            minimum_commission: Decimal::ONE,
            sell_fee_rate: Decimal::ZERO,
        };
        let h = harness_with(accepting_broker(), fees).await;
        let order = h
            .engine
            .submit_order(h.market(OrderSide::Buy, 10))
            .await
            .unwrap();
        h.execute(&order, FillQuantity::Full).await;

        let stored = h.engine.order(order.id()).await.unwrap();
        assert_eq!(stored.commission(), Money::from_i64(1));
        assert_eq!(
            h.tracker.cash(&h.portfolio).await.unwrap(),
            Money::from_i64(100_000 - 1_000 - 1)
        );
    }

    #[tokio::test]
    async fn cancel_requires_owner_and_open_order() {
        let h = harness().await;
        let order = h
            .engine
            .submit_order(h.market(OrderSide::Buy, 10))
            .await
            .unwrap();

        let foreign = h
            .engine
            .cancel_order(order.id(), &UserId::new("someone-else"))
            .await
            .unwrap_err();
        assert!(matches!(foreign, CoreError::Forbidden(_)));

        let cancelled = h.engine.cancel_order(order.id(), &h.user).await.unwrap();
        assert_eq!(cancelled.status(), OrderStatus::Cancelled);

        let again = h.engine.cancel_order(order.id(), &h.user).await.unwrap_err();
        assert!(matches!(again, CoreError::StateConflict(_)));

        let late = h.execute(&order, FillQuantity::Full).await;
        assert!(matches!(late, ExecutionOutcome::Ignored { .. }));
    }

    #[tokio::test]
    async fn emergency_stop_counts_outcomes() {
        let h = harness().await;
        let a = h.engine.submit_order(h.market(OrderSide::Buy, 1)).await.unwrap();
        let b = h.engine.submit_order(h.market(OrderSide::Buy, 2)).await.unwrap();
        let c = h.engine.submit_order(h.market(OrderSide::Buy, 3)).await.unwrap();
        h.execute(&c, FillQuantity::Full).await;

        let result = h.engine.emergency_stop(&h.user, "manual stop").await;

        assert_eq!(result.cancelled_count, 2);
        assert_eq!(result.failed_count, 0);
        assert_eq!(result.unaffected_count, 1);
        assert!(result.cancelled_order_ids.contains(a.id()));
        assert!(result.cancelled_order_ids.contains(b.id()));
        assert_eq!(h.events.count_of("EMERGENCY_STOP"), 1);
        assert!(!h.risk.is_halted(&h.user));
    }

    #[tokio::test]
    async fn unknown_portfolio_is_not_found() {
        let h = harness().await;
        let request = OrderRequest::market(
            h.user.clone(),
            PortfolioId::new("missing"),
            "AAPL",
            OrderSide::Buy,
            Quantity::from_i64(1),
        );
        let err = h.engine.submit_order(request).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    /// Broker whose calls can be told to never answer.
    struct StallingBroker {
        stall_submit: bool,
        stall_cancel_of: Option<BrokerOrderId>,
        submitted: AtomicUsize,
    }

    impl StallingBroker {
        fn new(stall_submit: bool, stall_cancel_of: Option<&str>) -> Self {
            Self {
                stall_submit,
                stall_cancel_of: stall_cancel_of.map(BrokerOrderId::new),
                submitted: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl BrokerPort for StallingBroker {
        async fn test_connection(&self) -> Result<(), BrokerError> {
            Ok(())
        }

        async fn get_account(&self) -> Result<AccountBalances, BrokerError> {
            Err(BrokerError::NotFound {
                order_id: "account".into(),
            })
        }

        async fn submit_order(
            &self,
            _request: SubmitOrderRequest,
        ) -> Result<BrokerOrderId, BrokerError> {
            if self.stall_submit {
                std::future::pending::<()>().await;
            }
            let n = self.submitted.fetch_add(1, Ordering::SeqCst);
            Ok(BrokerOrderId::new(format!("b-{n}")))
        }

        async fn cancel_order(&self, broker_order_id: &BrokerOrderId) -> Result<(), BrokerError> {
            if self.stall_cancel_of.as_ref() == Some(broker_order_id) {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_submit_times_out_and_rejects() {
        let h = harness_on(
            Arc::new(StallingBroker::new(true, None)),
            Arc::new(InMemoryPositionRepository::new()),
            FeeSchedule::free(),
        )
        .await;

        let err = h
            .engine
            .submit_order(h.market(OrderSide::Buy, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Connectivity(_)));
        assert!(err.to_string().contains("30000ms"));

        let orders = h.engine.orders_for_user(&h.user).await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status(), OrderStatus::Rejected);
        assert_eq!(h.events.count_of("ORDER_REJECTED"), 1);

        // The order lock was released, so a stop completes.
        let result = h.engine.emergency_stop(&h.user, "after timeout").await;
        assert_eq!(result.unaffected_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_cancel_fails_alone_during_emergency_stop() {
        let h = harness_on(
            Arc::new(StallingBroker::new(false, Some("b-0"))),
            Arc::new(InMemoryPositionRepository::new()),
            FeeSchedule::free(),
        )
        .await;
        let stuck = h.engine.submit_order(h.market(OrderSide::Buy, 1)).await.unwrap();
        let other = h.engine.submit_order(h.market(OrderSide::Buy, 2)).await.unwrap();

        let result = h.engine.emergency_stop(&h.user, "manual stop").await;

        assert_eq!(result.failed_order_ids, vec![stuck.id().clone()]);
        assert_eq!(result.cancelled_order_ids, vec![other.id().clone()]);
        let stored = h.engine.order(stuck.id()).await.unwrap();
        assert_eq!(stored.status(), OrderStatus::Submitted);

        let err = h.engine.cancel_order(stuck.id(), &h.user).await.unwrap_err();
        assert!(matches!(err, CoreError::Connectivity(_)));
    }

    #[tokio::test]
    async fn deactivated_connection_refuses_submission() {
        struct Deactivated(ConnectionId);

        impl ConnectionStatusPort for Deactivated {
            fn is_deactivated(&self, connection_id: &ConnectionId) -> bool {
                connection_id == &self.0
            }
        }

        let h = harness().await;
        let request = h.market(OrderSide::Buy, 1);
        let engine = h.engine.with_connection_status(
            ConnectionId::new("conn-1"),
            Arc::new(Deactivated(ConnectionId::new("conn-1"))),
        );

        let err = engine
            .submit_order(request)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Connectivity(_)));
        assert!(err.to_string().contains("conn-1"));
        assert!(engine.orders_for_user(&h.user).await.is_empty());
        assert_eq!(h.events.count_of("ORDER_SUBMITTED"), 0);
    }

    #[tokio::test]
    async fn cancel_racing_fill_has_one_winner() {
        let h = harness().await;
        let order = h
            .engine
            .submit_order(h.market(OrderSide::Buy, 10))
            .await
            .unwrap();

        let (fill, cancel) = tokio::join!(
            h.execute(&order, FillQuantity::Full),
            h.engine.cancel_order(order.id(), &h.user)
        );

        let stored = h.engine.order(order.id()).await.unwrap();
        match cancel {
            Ok(cancelled) => {
                assert_eq!(cancelled.status(), OrderStatus::Cancelled);
                assert!(matches!(fill, ExecutionOutcome::Ignored { .. }));
                assert_eq!(stored.filled_quantity(), Quantity::ZERO);
            }
            Err(CoreError::StateConflict(reason)) => {
                assert!(reason.contains("already"));
                assert!(fill.is_final());
                assert_eq!(stored.status(), OrderStatus::Filled);
            }
            Err(other) => panic!("unexpected cancel error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancel_after_fill_reports_already_filled() {
        let h = harness().await;
        let order = h
            .engine
            .submit_order(h.market(OrderSide::Buy, 10))
            .await
            .unwrap();
        h.execute(&order, FillQuantity::Full).await;

        let err = h.engine.cancel_order(order.id(), &h.user).await.unwrap_err();
        match err {
            CoreError::StateConflict(reason) => assert!(reason.contains("already FILLED")),
            other => panic!("expected state conflict, got {other:?}"),
        }
        assert_eq!(h.events.count_of("ORDER_CANCELLED"), 0);
    }

    /// Position store that refuses every write.
    struct ReadOnlyPositions;

    #[async_trait::async_trait]
    impl PositionRepository for ReadOnlyPositions {
        async fn save(&self, _position: &Position) -> Result<(), PersistenceError> {
            Err(PersistenceError::new("positions", "disk full"))
        }

        async fn find(
            &self,
            _portfolio_id: &PortfolioId,
            _symbol: &Symbol,
        ) -> Result<Option<Position>, PersistenceError> {
            Ok(None)
        }

        async fn find_by_portfolio(
            &self,
            _portfolio_id: &PortfolioId,
        ) -> Result<Vec<Position>, PersistenceError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn unbookable_fill_leaves_order_untouched() {
        let h = harness_on(
            Arc::new(accepting_broker()),
            Arc::new(ReadOnlyPositions),
            FeeSchedule::free(),
        )
        .await;
        let order = h
            .engine
            .submit_order(h.market(OrderSide::Buy, 10))
            .await
            .unwrap();

        let outcome = h.execute(&order, FillQuantity::Full).await;
        assert!(matches!(outcome, ExecutionOutcome::Ignored { .. }));

        let stored = h.engine.order(order.id()).await.unwrap();
        assert_eq!(stored.status(), OrderStatus::Submitted);
        assert_eq!(stored.filled_quantity(), Quantity::ZERO);
        assert!(stored.fills().is_empty());
        assert_eq!(
            h.tracker.cash(&h.portfolio).await.unwrap(),
            Money::from_i64(100_000)
        );
        assert_eq!(h.risk.ledger(&h.user).trade_count, 0);
        assert_eq!(h.events.count_of("ORDER_FILLED"), 0);
    }

    #[tokio::test]
    async fn ledger_follows_each_fill_from_the_channel() {
        let h = harness().await;
        let order = h
            .engine
            .submit_order(h.market(OrderSide::Buy, 10))
            .await
            .unwrap();
        let (sender, receiver) = execution_channel(8);
        let shutdown = CancellationToken::new();

        let report = |quantity| {
            let (responder, outcome) = tokio::sync::oneshot::channel();
            let report = ExecutionReport {
                order_id: order.id().clone(),
                broker_order_id: order.broker_order_id().cloned().unwrap(),
                quantity,
                price: None,
                broker_trade_id: None,
                responder: Some(responder),
            };
            (report, outcome)
        };

        let producer = async {
            let (first, first_outcome) = report(FillQuantity::Partial(dec!(0.5)));
            sender.send(first).await.unwrap();
            let first_outcome = first_outcome.await.unwrap();
            let after_first = h.risk.ledger(&h.user).trade_count;

            let (second, second_outcome) = report(FillQuantity::Full);
            sender.send(second).await.unwrap();
            let second_outcome = second_outcome.await.unwrap();
            let after_second = h.risk.ledger(&h.user).trade_count;

            shutdown.cancel();
            (first_outcome, after_first, second_outcome, after_second)
        };

        let ((), (first, after_first, second, after_second)) = tokio::join!(
            h.engine.run_execution_reports(receiver, shutdown.clone()),
            producer
        );

        assert_eq!(
            first,
            ExecutionOutcome::Applied {
                status: OrderStatus::PartiallyFilled,
                filled: Quantity::from_i64(5),
            }
        );
        assert_eq!(after_first, 1);
        assert!(second.is_final());
        assert_eq!(after_second, 2);
    }
}

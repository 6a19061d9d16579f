//! End-to-end scenarios over the composed services.
//!
//! Every test wires the four services over in-memory adapters and the
//! simulated broker, with paused time so simulated executions and probe
//! timers run deterministically.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use trading_core::application::ports::execution_channel;
use trading_core::application::services::{
    ConnectionHealthMonitor, EngineConfig, HealthMonitorConfig, OrderExecutionEngine,
    PositionTracker, RiskGovernor, RiskGovernorConfig, TrackerConfig,
};
use trading_core::domain::connection_health::ConnectionState;
use trading_core::domain::order_execution::{FeeSchedule, OrderRequest, OrderSide, OrderStatus};
use trading_core::domain::risk_management::{RiskCandidate, RiskCheck, RiskLimits};
use trading_core::domain::shared::{ConnectionId, Money, PortfolioId, Quantity, Symbol, UserId};
use trading_core::infrastructure::broker::{SimulatedBroker, SimulatedBrokerConfig};
use trading_core::infrastructure::events::RecordingEventPublisher;
use trading_core::infrastructure::market_data::InMemoryMarketData;
use trading_core::infrastructure::persistence::{
    InMemoryConnectionHealthRepository, InMemoryOrderRepository, InMemoryPerformanceRepository,
    InMemoryPositionRepository, InMemoryRiskLimitsRepository,
};
use trading_core::{BrokerError, CoreError};

struct System {
    engine: Arc<OrderExecutionEngine>,
    monitor: Arc<ConnectionHealthMonitor>,
    risk: Arc<RiskGovernor>,
    tracker: Arc<PositionTracker>,
    broker: Arc<SimulatedBroker>,
    prices: Arc<InMemoryMarketData>,
    events: Arc<RecordingEventPublisher>,
    user: UserId,
    portfolio: PortfolioId,
    shutdown: CancellationToken,
}

impl System {
    async fn start() -> Self {
        let shutdown = CancellationToken::new();
        let events = Arc::new(RecordingEventPublisher::new());
        let prices = Arc::new(InMemoryMarketData::with_prices([("AAPL", Money::from_i64(100))]));

        let (report_tx, report_rx) = execution_channel(64);
        let broker = Arc::new(SimulatedBroker::new(
            SimulatedBrokerConfig {
                partial_fill_probability: 0.0,
                partial_ratio_min: 0.5,
                partial_ratio_max: 0.5,
                min_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(10),
                seed: Some(1),
            },
            report_tx,
            shutdown.clone(),
        ));

        let risk = Arc::new(RiskGovernor::new(
            RiskGovernorConfig::default(),
            Arc::new(InMemoryRiskLimitsRepository::new()),
            events.clone(),
        ));
        let tracker = Arc::new(
            PositionTracker::new(
                TrackerConfig::default(),
                prices.clone(),
                Arc::new(InMemoryPositionRepository::new()),
                Arc::new(InMemoryPerformanceRepository::new()),
                events.clone(),
            )
            .with_risk_governor(risk.clone()),
        );
        let monitor = Arc::new(ConnectionHealthMonitor::new(
            HealthMonitorConfig::default(),
            Arc::new(InMemoryConnectionHealthRepository::new()),
            events.clone(),
        ));
        let engine = Arc::new(
            OrderExecutionEngine::new(
                EngineConfig {
                    live_trading_enabled: true,
                    fees: FeeSchedule::free(),
                    broker_timeout: Duration::from_secs(30),
                },
                broker.clone(),
                prices.clone(),
                Arc::new(InMemoryOrderRepository::new()),
                events.clone(),
                risk.clone(),
                tracker.clone(),
            )
            .with_connection_status(System::connection(), monitor.clone()),
        );
        {
            let engine = Arc::clone(&engine);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { engine.run_execution_reports(report_rx, shutdown).await });
        }

        let user = UserId::new("u-1");
        let portfolio = PortfolioId::new("p-1");
        tracker
            .open_portfolio(&portfolio, &user, Money::from_i64(100_000))
            .await
            .unwrap();

        Self {
            engine,
            monitor,
            risk,
            tracker,
            broker,
            prices,
            events,
            user,
            portfolio,
            shutdown,
        }
    }

    fn connection() -> ConnectionId {
        ConnectionId::new("conn-main")
    }

    fn market(&self, side: OrderSide, quantity: i64) -> OrderRequest {
        OrderRequest::market(
            self.user.clone(),
            self.portfolio.clone(),
            "AAPL",
            side,
            Quantity::from_i64(quantity),
        )
    }

    fn limit(&self, quantity: i64, price: i64) -> OrderRequest {
        OrderRequest::limit(
            self.user.clone(),
            self.portfolio.clone(),
            "AAPL",
            OrderSide::Buy,
            Quantity::from_i64(quantity),
            Money::from_i64(price),
        )
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

impl Drop for System {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.monitor.stop_all();
        self.tracker.stop_all();
    }
}

#[tokio::test]
async fn scenario_a_daily_loss_headroom_rejects_order() {
    let events = Arc::new(RecordingEventPublisher::new());
    let risk = RiskGovernor::new(
        RiskGovernorConfig::default(),
        Arc::new(InMemoryRiskLimitsRepository::new()),
        events,
    );
    let user = UserId::new("u-1");
    risk.set_limits(
        &user,
        RiskLimits {
            max_daily_loss: Money::from_i64(100),
            ..RiskLimits::default()
        },
    )
    .await
    .unwrap();
    risk.record_trade(&user, Money::from_i64(-90)).await;

    // 10 shares at 100 with a stop at 98 risks 20.
    let candidate = RiskCandidate {
        symbol: Symbol::new("AAPL"),
        side: OrderSide::Buy,
        quantity: Quantity::from_i64(10),
        reference_price: Money::from_i64(100),
        stop_price: Some(Money::from_i64(98)),
    };
    let decision = risk.check_order(&user, &candidate, &[], Money::from_i64(100_000));

    assert!(!decision.allowed);
    assert_eq!(decision.failed_check, Some(RiskCheck::DailyLoss));
    assert!(decision.reason.unwrap().contains("daily loss limit"));
    assert!(!risk.is_halted(&user));
}

#[tokio::test(start_paused = true)]
async fn scenario_b_order_notional_suggests_quantity() {
    let system = System::start().await;
    system
        .risk
        .set_limits(
            &system.user,
            RiskLimits {
                max_order_notional: Money::from_i64(10_000),
                ..RiskLimits::default()
            },
        )
        .await
        .unwrap();
    system.prices.set_price("AAPL", Money::from_i64(50));

    let err = system
        .engine
        .submit_order(system.market(OrderSide::Buy, 1_000))
        .await
        .unwrap_err();

    match err {
        CoreError::RiskRejection {
            check,
            reason,
            suggested_quantity,
        } => {
            assert_eq!(check, RiskCheck::OrderNotional);
            assert!(reason.contains("exceeds limit"));
            assert_eq!(suggested_quantity, Some(Quantity::from_i64(200)));
        }
        other => panic!("expected risk rejection, got {other:?}"),
    }
    assert!(system.engine.orders_for_user(&system.user).await.is_empty());
    assert_eq!(system.broker.working_orders(), 0);
}

#[tokio::test(start_paused = true)]
async fn scenario_c_three_failed_probes_deactivate_once() {
    let (report_tx, _report_rx) = execution_channel(1);
    let broker = Arc::new(SimulatedBroker::new(
        SimulatedBrokerConfig::default(),
        report_tx,
        CancellationToken::new(),
    ));
    broker.fail_connections(Some(BrokerError::Connectivity {
        message: "connection refused".into(),
    }));

    let repository = Arc::new(InMemoryConnectionHealthRepository::new());
    let events = Arc::new(RecordingEventPublisher::new());
    let monitor = Arc::new(ConnectionHealthMonitor::new(
        HealthMonitorConfig {
            check_interval: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(30),
            retry_ceiling: 3,
        },
        repository.clone(),
        events.clone(),
    ));

    let id = ConnectionId::new("conn-1");
    assert!(
        monitor
            .start_monitoring(id.clone(), UserId::new("u-1"), broker)
            .await
    );
    tokio::time::sleep(Duration::from_secs(600)).await;

    assert!(!monitor.is_monitored(&id));
    assert_eq!(events.count_of("USER_NOTIFICATION"), 1);
    let stored = repository.latest(&id).unwrap();
    assert_eq!(stored.state, ConnectionState::Deactivated);
    assert_eq!(stored.consecutive_failures, 3);
}

#[tokio::test(start_paused = true)]
async fn scenario_d_partial_close_realizes_profit() {
    let system = System::start().await;

    system
        .engine
        .submit_order(system.market(OrderSide::Buy, 10))
        .await
        .unwrap();
    System::settle().await;

    system.prices.set_price("AAPL", Money::from_i64(110));
    let sell = system
        .engine
        .submit_order(system.market(OrderSide::Sell, 4))
        .await
        .unwrap();
    System::settle().await;

    let sell = system.engine.order(sell.id()).await.unwrap();
    assert_eq!(sell.status(), OrderStatus::Filled);

    let position = system
        .tracker
        .position(&system.portfolio, &Symbol::new("AAPL"))
        .await
        .unwrap();
    assert_eq!(position.quantity, Quantity::from_i64(6));
    assert_eq!(position.average_price, Money::from_i64(100));
    assert_eq!(position.realized_pnl, Money::from_i64(40));

    let ledger = system.risk.ledger(&system.user);
    assert_eq!(ledger.daily_pnl, Money::from_i64(40));
    assert_eq!(ledger.trade_count, 2);

    // 100_000 - 10 * 100 + 4 * 110
    assert_eq!(
        system.tracker.cash(&system.portfolio).await.unwrap(),
        Money::from_i64(99_440)
    );
    assert_eq!(system.events.count_of("ORDER_FILLED"), 2);
}

#[tokio::test(start_paused = true)]
async fn scenario_e_emergency_stop_reports_counts() {
    let system = System::start().await;

    let filled = system
        .engine
        .submit_order(system.market(OrderSide::Buy, 5))
        .await
        .unwrap();
    System::settle().await;
    assert_eq!(
        system.engine.order(filled.id()).await.unwrap().status(),
        OrderStatus::Filled
    );

    // Limits far below the market never trigger.
    let first = system.engine.submit_order(system.limit(1, 50)).await.unwrap();
    let second = system.engine.submit_order(system.limit(2, 60)).await.unwrap();
    System::settle().await;

    let result = system
        .engine
        .emergency_stop(&system.user, "user pressed stop")
        .await;

    assert_eq!(result.cancelled_count, 2);
    assert_eq!(result.failed_count, 0);
    assert_eq!(result.unaffected_count, 1);
    assert!(result.cancelled_order_ids.contains(first.id()));
    assert!(result.cancelled_order_ids.contains(second.id()));
    assert!(system.engine.open_orders(&system.user).await.is_empty());
    assert_eq!(system.events.count_of("EMERGENCY_STOP"), 1);

    System::settle().await;
    assert_eq!(system.broker.working_orders(), 0);
    assert_eq!(
        system
            .tracker
            .position(&system.portfolio, &Symbol::new("AAPL"))
            .await
            .unwrap()
            .quantity,
        Quantity::from_i64(5)
    );
}

#[tokio::test(start_paused = true)]
async fn daily_loss_breach_halts_further_orders() {
    let system = System::start().await;
    system
        .risk
        .set_limits(
            &system.user,
            RiskLimits {
                max_daily_loss: Money::from_i64(100),
                ..RiskLimits::default()
            },
        )
        .await
        .unwrap();

    system
        .engine
        .submit_order(system.market(OrderSide::Buy, 10))
        .await
        .unwrap();
    System::settle().await;

    system.prices.set_price("AAPL", Money::from_i64(80));
    system
        .engine
        .submit_order(system.market(OrderSide::Sell, 10))
        .await
        .unwrap();
    System::settle().await;

    assert!(system.risk.is_halted(&system.user));
    assert_eq!(system.events.count_of("USER_NOTIFICATION"), 1);

    let err = system
        .engine
        .submit_order(system.market(OrderSide::Buy, 1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::RiskRejection {
            check: RiskCheck::EmergencyHalt,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn deactivated_connection_stops_order_flow() {
    let system = System::start().await;
    system
        .monitor
        .start_monitoring(System::connection(), system.user.clone(), system.broker.clone())
        .await;
    system
        .engine
        .submit_order(system.market(OrderSide::Buy, 1))
        .await
        .unwrap();
    System::settle().await;

    system.broker.fail_connections(Some(BrokerError::Connectivity {
        message: "connection refused".into(),
    }));
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert!(!system.monitor.is_monitored(&System::connection()));

    let err = system
        .engine
        .submit_order(system.market(OrderSide::Buy, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Connectivity(_)));
    assert_eq!(system.engine.orders_for_user(&system.user).await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn tracked_drawdown_blocks_orders_before_any_loss_is_realized() {
    let system = System::start().await;
    system
        .risk
        .set_limits(
            &system.user,
            RiskLimits {
                max_daily_loss: Money::from_i64(100),
                ..RiskLimits::default()
            },
        )
        .await
        .unwrap();
    system
        .engine
        .submit_order(system.market(OrderSide::Buy, 10))
        .await
        .unwrap();
    System::settle().await;

    // Ten shares marked 9 below cost: 90 of open drawdown.
    system.prices.set_price("AAPL", Money::from_i64(91));
    system.tracker.refresh(&system.portfolio).await.unwrap();
    assert_eq!(system.risk.ledger(&system.user).daily_pnl, Money::ZERO);

    // Another ten at 91 risk 18.20 more with the default 2% stop.
    let err = system
        .engine
        .submit_order(system.market(OrderSide::Buy, 10))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::RiskRejection {
            check: RiskCheck::DailyLoss,
            ..
        }
    ));
}

//! Trading Core Binary
//!
//! Runs the four services over in-memory adapters, the simulated broker and
//! a random-walk price cache, with one demo user and portfolio.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin trading-core -- config.yaml
//! ```
//!
//! # Environment Variables
//!
//! - `TRADING_CORE_CONFIG`: config file path when no argument is given
//! - `RUST_LOG`: overrides the configured log level
//! - any `${VAR}` referenced from the config file

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use rust_decimal_macros::dec;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use trading_core::application::ports::execution_channel;
use trading_core::application::services::{
    ConnectionHealthMonitor, EngineConfig, HealthMonitorConfig, OrderExecutionEngine,
    PositionTracker, RiskGovernor, RiskGovernorConfig, TrackerConfig,
};
use trading_core::config::{Config, load_config};
use trading_core::domain::order_execution::{OrderRequest, OrderSide};
use trading_core::domain::shared::{ConnectionId, Money, PortfolioId, Quantity, UserId};
use trading_core::infrastructure::broker::{SimulatedBroker, SimulatedBrokerConfig};
use trading_core::infrastructure::events::BroadcastEventPublisher;
use trading_core::infrastructure::market_data::InMemoryMarketData;
use trading_core::infrastructure::persistence::{
    InMemoryConnectionHealthRepository, InMemoryOrderRepository, InMemoryPerformanceRepository,
    InMemoryPositionRepository, InMemoryRiskLimitsRepository,
};
use trading_core::observability::{MetricsConfig, init_metrics};
use trading_core::telemetry::init_tracing;

/// Default config file looked up in the working directory.
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Interval of the simulated price random walk.
const PRICE_TICK: Duration = Duration::from_secs(1);

/// Grace period for background tasks after cancellation.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

/// Demo user, portfolio and connection wired at startup.
const DEMO_USER: &str = "demo-user";
const DEMO_PORTFOLIO: &str = "demo-portfolio";
const DEMO_CONNECTION: &str = "demo-connection";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let config = read_config()?;
    init_tracing(&config.observability.logging).context("failed to initialize tracing")?;

    tracing::info!(
        live_trading = config.execution.live_trading_enabled,
        simulation = config.execution.simulation_mode,
        "Starting trading core"
    );

    if let Some(addr) = &config.observability.metrics.prometheus_addr {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("invalid metrics address '{addr}'"))?;
        init_metrics(&MetricsConfig::with_addr(addr)).context("failed to start metrics")?;
    }

    if !config.execution.simulation_mode {
        bail!("no live broker adapter is available; enable execution.simulation_mode");
    }

    let shutdown = CancellationToken::new();

    // Events
    let events = Arc::new(BroadcastEventPublisher::default());
    let event_logger = events.spawn_logger(shutdown.clone());

    // Market data
    let market_data = Arc::new(InMemoryMarketData::with_prices([
        ("AAPL", Money::new(dec!(190.00))),
        ("MSFT", Money::new(dec!(420.00))),
        ("NVDA", Money::new(dec!(120.00))),
        ("SPY", Money::new(dec!(550.00))),
    ]));
    let price_walk = market_data.spawn_random_walk(
        PRICE_TICK,
        dec!(0.002),
        config.simulation.seed,
        shutdown.clone(),
    );

    // Broker
    let (report_tx, report_rx) = execution_channel(config.execution.report_channel_capacity);
    let broker = Arc::new(SimulatedBroker::new(
        SimulatedBrokerConfig::from(&config.simulation),
        report_tx,
        shutdown.clone(),
    ));

    // Services
    let risk = Arc::new(RiskGovernor::new(
        RiskGovernorConfig::from(&config.risk),
        Arc::new(InMemoryRiskLimitsRepository::new()),
        events.clone(),
    ));
    risk.load_limits().await?;
    for (user, limits) in &config.risk.user_limits {
        risk.set_limits(&UserId::new(user.as_str()), limits.clone())
            .await
            .with_context(|| format!("invalid risk limits for user '{user}'"))?;
    }
    risk.start();

    let tracker = Arc::new(
        PositionTracker::new(
            TrackerConfig::from(&config.tracking),
            market_data.clone(),
            Arc::new(InMemoryPositionRepository::new()),
            Arc::new(InMemoryPerformanceRepository::new()),
            events.clone(),
        )
        .with_risk_governor(risk.clone()),
    );
    tracker.start();

    let monitor = Arc::new(ConnectionHealthMonitor::new(
        HealthMonitorConfig::from(&config.health),
        Arc::new(InMemoryConnectionHealthRepository::new()),
        events.clone(),
    ));

    let engine = Arc::new(
        OrderExecutionEngine::new(
            EngineConfig::from(&config.execution),
            broker.clone(),
            market_data.clone(),
            Arc::new(InMemoryOrderRepository::new()),
            events.clone(),
            risk.clone(),
            tracker.clone(),
        )
        .with_connection_status(ConnectionId::new(DEMO_CONNECTION), monitor.clone()),
    );
    let report_consumer = {
        let engine = Arc::clone(&engine);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { engine.run_execution_reports(report_rx, shutdown).await })
    };

    // Demo wiring
    let user = UserId::new(DEMO_USER);
    let portfolio = PortfolioId::new(DEMO_PORTFOLIO);
    tracker
        .open_portfolio(&portfolio, &user, Money::from_i64(100_000))
        .await?;
    tracker.start_tracking(&portfolio)?;
    monitor
        .start_monitoring(ConnectionId::new(DEMO_CONNECTION), user.clone(), broker.clone())
        .await;

    let demo_order = OrderRequest::market(
        user.clone(),
        portfolio.clone(),
        "AAPL",
        OrderSide::Buy,
        Quantity::from_i64(10),
    );
    match engine.submit_order(demo_order).await {
        Ok(order) => tracing::info!(order_id = %order.id(), "Demo order submitted"),
        Err(e) => tracing::warn!(error = %e, code = %e.code(), "Demo order refused"),
    }

    shutdown_signal().await;

    // Shutdown
    shutdown.cancel();
    monitor.stop_all();
    tracker.stop_all();
    tracker.stop();
    risk.stop();

    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        let _ = report_consumer.await;
        let _ = price_walk.await;
        let _ = event_logger.await;
    })
    .await;
    if drained.is_err() {
        tracing::warn!("Background tasks did not stop within the grace period");
    }

    tracing::info!("Trading core stopped");
    Ok(())
}

/// Config from the first argument, `TRADING_CORE_CONFIG`, or `config.yaml`
/// when present; defaults otherwise.
fn read_config() -> anyhow::Result<Config> {
    let explicit = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("TRADING_CORE_CONFIG").ok());

    match explicit {
        Some(path) => load_config(Some(&path)).with_context(|| format!("failed to load {path}")),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            load_config(Some(DEFAULT_CONFIG_PATH)).context("failed to load config.yaml")
        }
        None => Ok(Config::default()),
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for Ctrl+C or SIGTERM. A handler that cannot be installed never
/// fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}

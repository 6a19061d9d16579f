// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Trading Core Library
//!
//! Order execution, pre-trade risk, broker connection health and portfolio
//! tracking for a multi-user trading platform.
//!
//! # Architecture (Hexagonal + DDD)
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: aggregates, value objects and pure policies
//!   - `order_execution`: Order aggregate, lifecycle, fills, fees, pricing
//!   - `risk_management`: limits, daily ledger, admission checks
//!   - `portfolio`: positions, snapshots, daily performance
//!   - `connection_health`: probe streaks and deactivation
//!
//! - **Application**: ports and long-lived services
//!   - `OrderExecutionEngine`, `RiskGovernor`, `ConnectionHealthMonitor`,
//!     `PositionTracker`
//!
//! - **Infrastructure**: adapters
//!   - simulated broker, in-memory market data and repositories, event
//!     publishers
//!
//! Cross-cutting: `config` (YAML), `error` (`CoreError`), `observability`
//! (metrics) and `telemetry` (tracing subscriber).

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Layers
// =============================================================================

/// Domain layer - Core business logic with no external dependencies.
pub mod domain;

/// Application layer - Services and port definitions.
pub mod application;

/// Infrastructure layer - Adapters.
pub mod infrastructure;

// =============================================================================
// Cross-cutting
// =============================================================================

/// Configuration loading and validation.
pub mod config;

/// Top-level error type.
pub mod error;

/// Metrics.
pub mod observability;

/// Tracing subscriber setup.
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

// Domain re-exports
pub use domain::events::{DomainEvent, EventChannel, NotificationSeverity};
pub use domain::order_execution::{
    Fill, Order, OrderRequest, OrderSide, OrderStatus, OrderType, TimeInForce,
};
pub use domain::risk_management::{RiskCheck, RiskDecision, RiskLimits};
pub use domain::shared::{
    BrokerOrderId, ConnectionId, Money, OrderId, PortfolioId, Quantity, Symbol, Timestamp, UserId,
};

// Application re-exports
pub use application::ports::{
    BrokerError, BrokerPort, EventPublisherPort, ExecutionOutcome, ExecutionReport, FillQuantity,
    MarketDataPort, NoOpEventPublisher, execution_channel,
};
pub use application::services::{
    ConnectionHealthMonitor, EmergencyStopResult, EngineConfig, HealthMonitorConfig,
    OrderExecutionEngine, PositionTracker, RiskGovernor, RiskGovernorConfig, TrackerConfig,
};

// Cross-cutting re-exports
pub use config::{Config, ConfigError, load_config};
pub use error::{CoreError, ErrorCode};

// Infrastructure re-exports
pub use infrastructure::broker::{SimulatedBroker, SimulatedBrokerConfig};
pub use infrastructure::events::{BroadcastEventPublisher, RecordingEventPublisher};
pub use infrastructure::market_data::InMemoryMarketData;
pub use infrastructure::persistence::{
    InMemoryConnectionHealthRepository, InMemoryOrderRepository, InMemoryPerformanceRepository,
    InMemoryPositionRepository, InMemoryRiskLimitsRepository,
};

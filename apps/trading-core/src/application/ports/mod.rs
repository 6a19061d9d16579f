//! Application Ports (Driver and Driven)
//!
//! Ports define interfaces for interacting with external systems.
//! - **Driver Ports** (Primary/Inbound): execution reports pushed by brokers
//! - **Driven Ports** (Secondary/Outbound): broker, market data, persistence,
//!   event sink

mod broker_port;
mod connection_health_port;
mod event_publisher_port;
mod execution_report_port;
mod market_data_port;
mod risk_repository_port;

#[cfg(test)]
pub use broker_port::MockBrokerPort;
pub use broker_port::{AccountBalances, BrokerError, BrokerPort, SubmitOrderRequest};
pub use connection_health_port::{
    ConnectionHealthRepository, ConnectionStatusPort, TransitionRecord,
};
pub use event_publisher_port::{EventPublishError, EventPublisherPort, NoOpEventPublisher};
pub use execution_report_port::{
    ExecutionOutcome, ExecutionReport, ExecutionReportReceiver, ExecutionReportSender,
    FillQuantity, execution_channel,
};
pub use market_data_port::MarketDataPort;
pub use risk_repository_port::RiskLimitsRepository;

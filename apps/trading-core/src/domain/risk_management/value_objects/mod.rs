//! Risk Management Value Objects

mod risk_decision;
mod risk_ledger;
mod risk_limits;
mod trading_hours;

pub use risk_decision::{PositionExposure, RiskCandidate, RiskCheck, RiskDecision};
pub use risk_ledger::RiskLedger;
pub use risk_limits::RiskLimits;
pub use trading_hours::TradingHours;

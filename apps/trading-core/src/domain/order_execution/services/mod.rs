//! Order Execution Domain Services

mod execution_pricing;
mod fee_model;
mod order_state_machine;

pub use execution_pricing::ExecutionPricing;
pub use fee_model::{FeeBreakdown, FeeSchedule};
pub use order_state_machine::OrderStateMachine;

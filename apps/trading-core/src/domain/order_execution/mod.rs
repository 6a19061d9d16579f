//! Order Execution Bounded Context
//!
//! The order lifecycle from request to terminal status.
//!
//! # Key Concepts
//!
//! - **Order Aggregate**: the root entity guarding status transitions
//! - **Fills**: immutable executions folded into filled quantity and VWAP
//! - **Fee schedule**: commission and regulatory fees per execution

pub mod aggregate;
pub mod errors;
pub mod repository;
pub mod services;
pub mod value_objects;

pub use aggregate::Order;
pub use errors::OrderError;
pub use repository::OrderRepository;
pub use services::{ExecutionPricing, FeeBreakdown, FeeSchedule, OrderStateMachine};
pub use value_objects::{Fill, OrderRequest, OrderSide, OrderStatus, OrderType, TimeInForce};

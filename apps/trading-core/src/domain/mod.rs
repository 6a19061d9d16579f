//! Domain Layer
//!
//! Business logic with no infrastructure dependencies:
//!
//! - **Aggregates**: consistency boundaries with invariants
//! - **Value Objects**: immutable types compared by value
//! - **Domain Events**: records of state changes, addressed to a channel
//! - **Domain Services**: stateless rules (admission, pricing, fees)
//! - **Repository Traits**: persistence abstractions implemented by adapters
//!
//! # Bounded Contexts
//!
//! - [`order_execution`]: order lifecycle, fills and fees
//! - [`risk_management`]: limits, daily ledger, admission
//! - [`portfolio`]: positions, snapshots, performance history
//! - [`connection_health`]: broker connection probing state

pub mod connection_health;
pub mod events;
pub mod order_execution;
pub mod portfolio;
pub mod risk_management;
pub mod shared;

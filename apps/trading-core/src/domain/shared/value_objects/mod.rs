//! Shared Value Objects
//!
//! Immutable domain types used across bounded contexts.

mod identifiers;
mod money;
mod quantity;
mod symbol;
mod timestamp;

pub use identifiers::{BrokerOrderId, ConnectionId, FillId, OrderId, PortfolioId, UserId};
pub use money::Money;
pub use quantity::Quantity;
pub use symbol::Symbol;
pub use timestamp::Timestamp;

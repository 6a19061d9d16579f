//! Shared Domain Types
//!
//! Value objects and errors shared across bounded contexts.

pub mod errors;
pub mod value_objects;

pub use errors::{DomainError, PersistenceError};
pub use value_objects::{
    BrokerOrderId, ConnectionId, FillId, Money, OrderId, PortfolioId, Quantity, Symbol, Timestamp,
    UserId,
};

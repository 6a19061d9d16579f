//! Order Repository Trait
//!
//! Write-through persistence for orders. Implemented by infrastructure
//! adapters.

use async_trait::async_trait;

use super::aggregate::Order;
use crate::domain::shared::{OrderId, PersistenceError, UserId};

/// Repository trait for Order persistence.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert or replace an order.
    ///
    /// # Errors
    ///
    /// Returns error if the store rejects the write.
    async fn save(&self, order: &Order) -> Result<(), PersistenceError>;

    /// Find an order by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, PersistenceError>;

    /// All orders owned by a user.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<Order>, PersistenceError>;

    /// Non-terminal orders across all users.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    async fn find_active(&self) -> Result<Vec<Order>, PersistenceError>;
}

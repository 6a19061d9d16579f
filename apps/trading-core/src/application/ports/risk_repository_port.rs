//! Risk Limits Repository Port (Driven Port)

use async_trait::async_trait;

use crate::domain::risk_management::RiskLimits;
use crate::domain::shared::{PersistenceError, UserId};

/// Durable store for per-user risk limits.
#[async_trait]
pub trait RiskLimitsRepository: Send + Sync {
    /// Insert or replace a user's limits.
    async fn save_limits(&self, user_id: &UserId, limits: &RiskLimits)
    -> Result<(), PersistenceError>;

    /// Limits of one user.
    async fn find_limits(&self, user_id: &UserId) -> Result<Option<RiskLimits>, PersistenceError>;

    /// Every stored user and their limits.
    async fn all_limits(&self) -> Result<Vec<(UserId, RiskLimits)>, PersistenceError>;
}

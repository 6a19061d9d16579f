//! In-memory repositories.
//!
//! Suitable for testing, simulation and development. Nothing survives a
//! restart.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::application::ports::{
    ConnectionHealthRepository, RiskLimitsRepository, TransitionRecord,
};
use crate::domain::connection_health::HealthRecord;
use crate::domain::order_execution::{Order, OrderRepository};
use crate::domain::portfolio::{
    PerformanceRecord, PerformanceRepository, Position, PositionRepository,
};
use crate::domain::risk_management::RiskLimits;
use crate::domain::shared::{
    ConnectionId, OrderId, PersistenceError, PortfolioId, Symbol, UserId,
};

// ============================================================================
// Orders
// ============================================================================

/// In-memory implementation of `OrderRepository`.
#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl InMemoryOrderRepository {
    /// Create a new empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    /// Check if the repository is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn save(&self, order: &Order) -> Result<(), PersistenceError> {
        self.orders.write().insert(order.id().clone(), order.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, PersistenceError> {
        Ok(self.orders.read().get(id).cloned())
    }

    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<Order>, PersistenceError> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .values()
            .filter(|o| o.user_id() == user_id)
            .cloned()
            .collect();
        orders.sort_by_key(Order::created_at);
        Ok(orders)
    }

    async fn find_active(&self) -> Result<Vec<Order>, PersistenceError> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .values()
            .filter(|o| !o.is_terminal())
            .cloned()
            .collect();
        orders.sort_by_key(Order::created_at);
        Ok(orders)
    }
}

// ============================================================================
// Positions and performance
// ============================================================================

/// In-memory implementation of `PositionRepository`.
#[derive(Debug, Default)]
pub struct InMemoryPositionRepository {
    positions: RwLock<HashMap<PortfolioId, BTreeMap<Symbol, Position>>>,
}

impl InMemoryPositionRepository {
    /// Create a new empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PositionRepository for InMemoryPositionRepository {
    async fn save(&self, position: &Position) -> Result<(), PersistenceError> {
        self.positions
            .write()
            .entry(position.portfolio_id.clone())
            .or_default()
            .insert(position.symbol.clone(), position.clone());
        Ok(())
    }

    async fn find(
        &self,
        portfolio_id: &PortfolioId,
        symbol: &Symbol,
    ) -> Result<Option<Position>, PersistenceError> {
        Ok(self
            .positions
            .read()
            .get(portfolio_id)
            .and_then(|book| book.get(symbol))
            .cloned())
    }

    async fn find_by_portfolio(
        &self,
        portfolio_id: &PortfolioId,
    ) -> Result<Vec<Position>, PersistenceError> {
        Ok(self
            .positions
            .read()
            .get(portfolio_id)
            .map(|book| book.values().cloned().collect())
            .unwrap_or_default())
    }
}

/// In-memory implementation of `PerformanceRepository`.
#[derive(Debug, Default)]
pub struct InMemoryPerformanceRepository {
    records: RwLock<HashMap<PortfolioId, Vec<PerformanceRecord>>>,
}

impl InMemoryPerformanceRepository {
    /// Create a new empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PerformanceRepository for InMemoryPerformanceRepository {
    async fn append(&self, record: &PerformanceRecord) -> Result<(), PersistenceError> {
        self.records
            .write()
            .entry(record.portfolio_id.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn history(
        &self,
        portfolio_id: &PortfolioId,
    ) -> Result<Vec<PerformanceRecord>, PersistenceError> {
        Ok(self
            .records
            .read()
            .get(portfolio_id)
            .cloned()
            .unwrap_or_default())
    }
}

// ============================================================================
// Risk limits
// ============================================================================

/// In-memory implementation of `RiskLimitsRepository`.
#[derive(Debug, Default)]
pub struct InMemoryRiskLimitsRepository {
    limits: RwLock<BTreeMap<UserId, RiskLimits>>,
}

impl InMemoryRiskLimitsRepository {
    /// Create a new empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RiskLimitsRepository for InMemoryRiskLimitsRepository {
    async fn save_limits(
        &self,
        user_id: &UserId,
        limits: &RiskLimits,
    ) -> Result<(), PersistenceError> {
        self.limits.write().insert(user_id.clone(), limits.clone());
        Ok(())
    }

    async fn find_limits(&self, user_id: &UserId) -> Result<Option<RiskLimits>, PersistenceError> {
        Ok(self.limits.read().get(user_id).cloned())
    }

    async fn all_limits(&self) -> Result<Vec<(UserId, RiskLimits)>, PersistenceError> {
        Ok(self
            .limits
            .read()
            .iter()
            .map(|(user, limits)| (user.clone(), limits.clone()))
            .collect())
    }
}

// ============================================================================
// Connection health
// ============================================================================

/// In-memory implementation of `ConnectionHealthRepository`.
#[derive(Debug, Default)]
pub struct InMemoryConnectionHealthRepository {
    records: RwLock<HashMap<ConnectionId, HealthRecord>>,
    transitions: RwLock<HashMap<ConnectionId, Vec<TransitionRecord>>>,
}

impl InMemoryConnectionHealthRepository {
    /// Create a new empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest saved record of a connection, deactivated ones included.
    #[must_use]
    pub fn latest(&self, connection_id: &ConnectionId) -> Option<HealthRecord> {
        self.records.read().get(connection_id).cloned()
    }
}

#[async_trait]
impl ConnectionHealthRepository for InMemoryConnectionHealthRepository {
    async fn save(&self, record: &HealthRecord) -> Result<(), PersistenceError> {
        self.records
            .write()
            .insert(record.connection_id.clone(), record.clone());
        Ok(())
    }

    async fn record_transition(
        &self,
        transition: TransitionRecord,
    ) -> Result<(), PersistenceError> {
        self.transitions
            .write()
            .entry(transition.connection_id.clone())
            .or_default()
            .push(transition);
        Ok(())
    }

    async fn transitions(
        &self,
        connection_id: &ConnectionId,
    ) -> Result<Vec<TransitionRecord>, PersistenceError> {
        Ok(self
            .transitions
            .read()
            .get(connection_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::connection_health::HealthTransition;
    use crate::domain::order_execution::{OrderRequest, OrderSide};
    use crate::domain::shared::{BrokerOrderId, Money, Quantity, Timestamp};

    fn order(user: &str) -> Order {
        Order::new(OrderRequest::market(
            UserId::new(user),
            PortfolioId::new("p-1"),
            "AAPL",
            OrderSide::Buy,
            Quantity::from_i64(100),
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn save_and_find_order() {
        let repo = InMemoryOrderRepository::new();
        let order = order("u-1");

        repo.save(&order).await.unwrap();

        let found = repo.find_by_id(order.id()).await.unwrap();
        assert_eq!(found.as_ref().map(Order::id), Some(order.id()));
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn active_orders_exclude_terminal() {
        let repo = InMemoryOrderRepository::new();
        let open = order("u-1");
        let mut done = order("u-1");
        done.mark_submitted(BrokerOrderId::new("b-1")).unwrap();
        done.cancel("test").unwrap();

        repo.save(&open).await.unwrap();
        repo.save(&done).await.unwrap();

        let active = repo.find_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id(), open.id());
        assert_eq!(repo.find_by_user(&UserId::new("u-1")).await.unwrap().len(), 2);
        assert!(repo.find_by_user(&UserId::new("u-2")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn positions_are_keyed_by_portfolio_and_symbol() {
        let repo = InMemoryPositionRepository::new();
        let portfolio = PortfolioId::new("p-1");
        let mut position = Position::new(UserId::new("u-1"), portfolio.clone(), "AAPL".into());
        position.apply_fill(OrderSide::Buy, Quantity::from_i64(10), Money::from_i64(100));

        repo.save(&position).await.unwrap();
        position.apply_fill(OrderSide::Buy, Quantity::from_i64(5), Money::from_i64(100));
        repo.save(&position).await.unwrap();

        let stored = repo.find(&portfolio, &"AAPL".into()).await.unwrap().unwrap();
        assert_eq!(stored.quantity, Quantity::from_i64(15));
        assert_eq!(repo.find_by_portfolio(&portfolio).await.unwrap().len(), 1);
        assert!(repo
            .find_by_portfolio(&PortfolioId::new("other"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn transitions_append_in_order() {
        let repo = InMemoryConnectionHealthRepository::new();
        let id = ConnectionId::new("c-1");
        for transition in [HealthTransition::Disconnected, HealthTransition::Reconnected] {
            repo.record_transition(TransitionRecord {
                connection_id: id.clone(),
                transition,
                error: None,
                at: Timestamp::now(),
            })
            .await
            .unwrap();
        }

        let stored: Vec<_> = repo
            .transitions(&id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.transition)
            .collect();
        assert_eq!(
            stored,
            vec![HealthTransition::Disconnected, HealthTransition::Reconnected]
        );
        assert!(repo.latest(&id).is_none());
    }
}

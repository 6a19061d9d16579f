//! Simulated broker implementing `BrokerPort`.
//!
//! Accepts every order and, after a random delay, pushes executions back
//! through the execution report channel. Each execution fills the whole
//! remainder, or with some probability a random share of it. Prices are left
//! to the engine, which reads them from market data, so limit and stop
//! orders keep retrying until the market crosses or they are cancelled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    AccountBalances, BrokerError, BrokerPort, ExecutionOutcome, ExecutionReport,
    ExecutionReportSender, FillQuantity, SubmitOrderRequest,
};
use crate::config::SimulationConfig;
use crate::domain::shared::{BrokerOrderId, Money, OrderId};

/// Fill simulation parameters.
#[derive(Debug, Clone)]
pub struct SimulatedBrokerConfig {
    /// Probability that an execution is partial.
    pub partial_fill_probability: f64,
    /// Smallest partial share of the remainder.
    pub partial_ratio_min: f64,
    /// Largest partial share of the remainder.
    pub partial_ratio_max: f64,
    /// Shortest delay before each execution attempt.
    pub min_delay: Duration,
    /// Longest delay before each execution attempt.
    pub max_delay: Duration,
    /// Fixed seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for SimulatedBrokerConfig {
    fn default() -> Self {
        Self::from(&SimulationConfig::default())
    }
}

impl From<&SimulationConfig> for SimulatedBrokerConfig {
    fn from(config: &SimulationConfig) -> Self {
        Self {
            partial_fill_probability: config.partial_fill_probability,
            partial_ratio_min: config.partial_ratio_min,
            partial_ratio_max: config.partial_ratio_max,
            min_delay: Duration::from_millis(config.min_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            seed: config.seed,
        }
    }
}

/// Randomized broker for simulation mode and tests.
pub struct SimulatedBroker {
    config: SimulatedBrokerConfig,
    reports: ExecutionReportSender,
    rng: Mutex<StdRng>,
    account: RwLock<AccountBalances>,
    working: Arc<RwLock<HashMap<BrokerOrderId, CancellationToken>>>,
    connection_failure: RwLock<Option<BrokerError>>,
    submission_failure: RwLock<Option<BrokerError>>,
    shutdown: CancellationToken,
}

impl SimulatedBroker {
    /// Create a broker that pushes executions into `reports`.
    #[must_use]
    pub fn new(
        config: SimulatedBrokerConfig,
        reports: ExecutionReportSender,
        shutdown: CancellationToken,
    ) -> Self {
        let rng = config
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        Self {
            config,
            reports,
            rng: Mutex::new(rng),
            account: RwLock::new(AccountBalances {
                account_id: "SIM".to_string(),
                cash: Money::from_i64(100_000),
                buying_power: Money::from_i64(100_000),
                equity: Money::from_i64(100_000),
            }),
            working: Arc::new(RwLock::new(HashMap::new())),
            connection_failure: RwLock::new(None),
            submission_failure: RwLock::new(None),
            shutdown,
        }
    }

    /// Replace the balances `get_account` reports.
    pub fn set_account(&self, account: AccountBalances) {
        *self.account.write() = account;
    }

    /// Make connection probes fail with `error`, or succeed again with `None`.
    pub fn fail_connections(&self, error: Option<BrokerError>) {
        *self.connection_failure.write() = error;
    }

    /// Make submissions fail with `error`, or succeed again with `None`.
    pub fn fail_submissions(&self, error: Option<BrokerError>) {
        *self.submission_failure.write() = error;
    }

    /// Orders still being worked.
    #[must_use]
    pub fn working_orders(&self) -> usize {
        self.working.read().len()
    }

    fn next_broker_id(&self) -> BrokerOrderId {
        BrokerOrderId::new(format!("SIM-{}", uuid::Uuid::new_v4()))
    }
}

#[async_trait]
impl BrokerPort for SimulatedBroker {
    async fn test_connection(&self) -> Result<(), BrokerError> {
        match self.connection_failure.read().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn get_account(&self) -> Result<AccountBalances, BrokerError> {
        self.test_connection().await?;
        Ok(self.account.read().clone())
    }

    async fn submit_order(
        &self,
        request: SubmitOrderRequest,
    ) -> Result<BrokerOrderId, BrokerError> {
        if let Some(error) = self.submission_failure.read().clone() {
            return Err(error);
        }
        if self.reports.is_closed() {
            return Err(BrokerError::Connectivity {
                message: "execution report channel closed".to_string(),
            });
        }

        let broker_order_id = self.next_broker_id();
        let token = self.shutdown.child_token();
        self.working
            .write()
            .insert(broker_order_id.clone(), token.clone());

        let seed: u64 = self.rng.lock().random();
        let worker = OrderWorker {
            config: self.config.clone(),
            order_id: request.client_order_id.clone(),
            broker_order_id: broker_order_id.clone(),
            reports: self.reports.clone(),
            working: Arc::clone(&self.working),
            rng: StdRng::seed_from_u64(seed),
        };
        tokio::spawn(worker.run(token));

        tracing::debug!(
            order_id = %request.client_order_id,
            broker_order_id = %broker_order_id,
            symbol = %request.symbol,
            order_type = %request.order_type,
            "Simulated order accepted"
        );
        Ok(broker_order_id)
    }

    async fn cancel_order(&self, broker_order_id: &BrokerOrderId) -> Result<(), BrokerError> {
        let token = self.working.write().remove(broker_order_id);
        match token {
            Some(token) => {
                token.cancel();
                tracing::debug!(broker_order_id = %broker_order_id, "Simulated order cancelled");
                Ok(())
            }
            None => Err(BrokerError::NotFound {
                order_id: broker_order_id.to_string(),
            }),
        }
    }
}

/// Background task working one order.
struct OrderWorker {
    config: SimulatedBrokerConfig,
    order_id: OrderId,
    broker_order_id: BrokerOrderId,
    reports: ExecutionReportSender,
    working: Arc<RwLock<HashMap<BrokerOrderId, CancellationToken>>>,
    rng: StdRng,
}

impl OrderWorker {
    async fn run(mut self, cancelled: CancellationToken) {
        loop {
            let delay = self.next_delay();
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancelled.cancelled() => break,
            }

            let (responder, outcome) = oneshot::channel();
            let report = ExecutionReport {
                order_id: self.order_id.clone(),
                broker_order_id: self.broker_order_id.clone(),
                quantity: self.next_quantity(),
                price: None,
                broker_trade_id: Some(format!("SIM-T-{}", uuid::Uuid::new_v4())),
                responder: Some(responder),
            };
            if self.reports.send(report).await.is_err() {
                tracing::debug!(order_id = %self.order_id, "Report channel closed");
                break;
            }

            match outcome.await {
                Ok(outcome) if outcome.is_final() => {
                    tracing::debug!(order_id = %self.order_id, ?outcome, "Simulated order done");
                    break;
                }
                Ok(ExecutionOutcome::NotTriggered | ExecutionOutcome::Applied { .. }) => {}
                Ok(ExecutionOutcome::Ignored { .. }) | Err(_) => break,
            }
        }
        self.working.write().remove(&self.broker_order_id);
    }

    fn next_delay(&mut self) -> Duration {
        let (low, high) = ordered(self.config.min_delay, self.config.max_delay);
        if low == high {
            return low;
        }
        self.rng.random_range(low..=high)
    }

    fn next_quantity(&mut self) -> FillQuantity {
        let probability = self.config.partial_fill_probability.clamp(0.0, 1.0);
        if !self.rng.random_bool(probability) {
            return FillQuantity::Full;
        }
        let (low, high) = ordered(self.config.partial_ratio_min, self.config.partial_ratio_max);
        let ratio = if low < high {
            self.rng.random_range(low..=high)
        } else {
            low
        };
        Decimal::from_f64_retain(ratio)
            .map_or(FillQuantity::Full, |r| FillQuantity::Partial(r.round_dp(4)))
    }
}

fn ordered<T: PartialOrd>(a: T, b: T) -> (T, T) {
    if a <= b { (a, b) } else { (b, a) }
}

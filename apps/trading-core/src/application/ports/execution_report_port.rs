//! Execution Report Channel (Driving Port)
//!
//! Brokers push executions to the engine through this channel. Reports are
//! consumed in arrival order, so executions of one order are never reordered.

use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot};

use crate::domain::order_execution::value_objects::OrderStatus;
use crate::domain::shared::{BrokerOrderId, Money, OrderId, Quantity};

/// How much of the open quantity an execution covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillQuantity {
    /// Everything still open.
    Full,
    /// A fraction of the open quantity in `(0, 1)`.
    Partial(Decimal),
    /// An explicit quantity, capped at the open quantity.
    Exact(Quantity),
}

/// What the engine did with a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// A fill was applied.
    Applied {
        /// Status after the fill.
        status: OrderStatus,
        /// Cumulative filled quantity.
        filled: Quantity,
    },
    /// Price conditions were not met; nothing changed.
    NotTriggered,
    /// The report could not be applied (terminal order, unknown order,
    /// missing price).
    Ignored {
        /// Why.
        reason: String,
    },
}

impl ExecutionOutcome {
    /// True when the order can receive no more executions.
    #[must_use]
    pub fn is_final(&self) -> bool {
        match self {
            Self::Applied { status, .. } => status.is_terminal(),
            Self::NotTriggered => false,
            Self::Ignored { .. } => true,
        }
    }
}

/// One execution from a broker.
#[derive(Debug)]
pub struct ExecutionReport {
    /// Engine order id.
    pub order_id: OrderId,
    /// Broker order id.
    pub broker_order_id: BrokerOrderId,
    /// Executed quantity.
    pub quantity: FillQuantity,
    /// Execution price; `None` lets the engine price from market data.
    pub price: Option<Money>,
    /// Broker trade id.
    pub broker_trade_id: Option<String>,
    /// Receives the outcome once the report is processed.
    pub responder: Option<oneshot::Sender<ExecutionOutcome>>,
}

/// Producer side of the report channel.
pub type ExecutionReportSender = mpsc::Sender<ExecutionReport>;

/// Consumer side of the report channel.
pub type ExecutionReportReceiver = mpsc::Receiver<ExecutionReport>;

/// Create a bounded report channel.
#[must_use]
pub fn execution_channel(capacity: usize) -> (ExecutionReportSender, ExecutionReportReceiver) {
    mpsc::channel(capacity.max(1))
}

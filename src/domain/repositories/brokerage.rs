//! Brokerage gateway port.
//!
//! The engine never talks to a broker API directly; it goes through this
//! trait so live gateways, paper gateways and test doubles are
//! interchangeable.

use crate::domain::entities::OrderSide;
use crate::domain::errors::ExecutionError;
use crate::domain::value_objects::Quantity;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type BrokerageResult<T> = Result<T, ExecutionError>;

/// Broker-reported order state, normalized from gateway-specific strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrokerReportedStatus {
    Submitted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    /// A status string the gateway adapter did not recognize. Passed through
    /// so the sweep can log it without guessing.
    Unknown(String),
}

/// Point-in-time order report from the brokerage.
///
/// Adapters should populate fill statistics from per-fill execution data
/// when the gateway provides it, falling back to the aggregates on the
/// order status message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusReport {
    pub status: BrokerReportedStatus,
    pub filled_quantity: Decimal,
    pub avg_fill_price: Decimal,
    pub commission: Decimal,
}

impl OrderStatusReport {
    pub fn filled(quantity: Decimal, avg_price: Decimal, commission: Decimal) -> Self {
        Self {
            status: BrokerReportedStatus::Filled,
            filled_quantity: quantity,
            avg_fill_price: avg_price,
            commission,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: BrokerReportedStatus::Cancelled,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: Decimal::ZERO,
            commission: Decimal::ZERO,
        }
    }
}

/// Connection to one brokerage gateway.
#[async_trait]
pub trait BrokerageConnector: Send + Sync {
    /// Human-readable gateway name for logs.
    fn name(&self) -> &str;

    async fn connect(&self) -> BrokerageResult<()>;

    async fn disconnect(&self);

    /// Submits a market order and returns the broker-side order id.
    async fn submit_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Quantity,
    ) -> BrokerageResult<String>;

    /// Fetches the current status of a previously submitted order.
    async fn order_status(&self, broker_order_id: &str) -> BrokerageResult<OrderStatusReport>;

    /// Requests cancellation. Returns true when the broker accepted the
    /// request; the actual CANCELLED state arrives via `order_status`.
    async fn cancel_order(&self, broker_order_id: &str) -> BrokerageResult<bool>;
}

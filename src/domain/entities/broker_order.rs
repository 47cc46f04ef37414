//! Broker order entity and its status state machine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Lifecycle of a broker order.
///
/// `Filled`, `Cancelled` and `Rejected` are terminal; once reached, further
/// broker status reports are ignored. `PartiallyFilled` may repeat as fills
/// accumulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrokerOrderStatus {
    Pending,
    Submitted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl BrokerOrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BrokerOrderStatus::Filled | BrokerOrderStatus::Cancelled | BrokerOrderStatus::Rejected
        )
    }

    /// Active orders are the ones the reconciliation sweep polls.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            BrokerOrderStatus::Submitted | BrokerOrderStatus::PartiallyFilled
        )
    }

    pub fn can_transition_to(&self, next: BrokerOrderStatus) -> bool {
        use BrokerOrderStatus::*;
        match self {
            Pending => matches!(next, Submitted | Rejected | Cancelled),
            Submitted => matches!(next, PartiallyFilled | Filled | Cancelled | Rejected),
            PartiallyFilled => matches!(next, PartiallyFilled | Filled | Cancelled),
            Filled | Cancelled | Rejected => false,
        }
    }
}

impl fmt::Display for BrokerOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BrokerOrderStatus::Pending => "PENDING",
            BrokerOrderStatus::Submitted => "SUBMITTED",
            BrokerOrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            BrokerOrderStatus::Filled => "FILLED",
            BrokerOrderStatus::Cancelled => "CANCELLED",
            BrokerOrderStatus::Rejected => "REJECTED",
        };
        write!(f, "{}", s)
    }
}

/// An order handed to the brokerage, tracked until it reaches a terminal
/// state.
///
/// `reserved_cash` is the estimated cost set aside at submission for buys;
/// zero for sells. It is settled (refunded or spent) exactly once, when the
/// order turns terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerOrder {
    /// Our identifier, assigned before submission.
    pub client_order_id: String,
    /// Brokerage-side identifier, known once submission succeeds.
    pub broker_order_id: Option<String>,
    pub account_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub avg_fill_price: Option<Decimal>,
    pub commission: Decimal,
    pub status: BrokerOrderStatus,
    pub reserved_cash: Decimal,
    /// The day-trade position this order opens or closes.
    pub position_id: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status_message: Option<String>,
}

impl BrokerOrder {
    pub fn new(
        client_order_id: &str,
        account_id: &str,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
    ) -> Self {
        Self {
            client_order_id: client_order_id.to_string(),
            broker_order_id: None,
            account_id: account_id.to_string(),
            symbol: symbol.to_string(),
            side,
            quantity,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: None,
            commission: Decimal::ZERO,
            status: BrokerOrderStatus::Pending,
            reserved_cash: Decimal::ZERO,
            position_id: None,
            submitted_at: None,
            completed_at: None,
            status_message: None,
        }
    }

    /// Quantity still waiting for a fill.
    pub fn remaining_quantity(&self) -> Decimal {
        self.quantity - self.filled_quantity
    }
}

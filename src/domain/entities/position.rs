//! Day-trade position entity.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a day-trade position.
///
/// Brokered entries sit in `Pending` until the entry order fills; simulated
/// entries open immediately. `Closing` marks an exit order in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Pending,
    Open,
    Closing,
    Closed,
    Cancelled,
}

impl PositionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PositionStatus::Closed | PositionStatus::Cancelled)
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PositionStatus::Pending => "PENDING",
            PositionStatus::Open => "OPEN",
            PositionStatus::Closing => "CLOSING",
            PositionStatus::Closed => "CLOSED",
            PositionStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{}", s)
    }
}

/// Why a position was exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    TargetHit,
    StopHit,
    SessionClose,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::TargetHit => "target_hit",
            ExitReason::StopHit => "stop_hit",
            ExitReason::SessionClose => "session_close",
        };
        write!(f, "{}", s)
    }
}

/// A single intraday round trip: entry, managed exit, and the prediction
/// that motivated it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayTradePosition {
    pub id: String,
    pub account_id: String,
    pub symbol: String,
    pub trade_date: NaiveDate,
    pub status: PositionStatus,
    pub shares: Decimal,
    pub entry_price: Decimal,
    pub target_price: Decimal,
    pub stop_price: Decimal,
    pub exit_price: Option<Decimal>,
    pub exit_reason: Option<ExitReason>,
    pub confidence_score: f64,
    pub predicted_return: f64,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl DayTradePosition {
    /// Realized profit and loss, available once the position is closed.
    pub fn realized_pnl(&self) -> Option<Decimal> {
        self.exit_price
            .map(|exit| (exit - self.entry_price) * self.shares)
    }
}

//! Error types for the trading engine.
//!
//! Split by layer: `ValidationError` for construction-time input checks,
//! `LedgerError` for bookkeeping rejections, `ExecutionError` for the order
//! path (brokerage connectivity and order handling), and
//! `ReconciliationError` for the drift sweep.

use rust_decimal::Decimal;
use thiserror::Error;

/// Rejections raised while constructing value objects and events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid price: {0} (must be positive)")]
    InvalidPrice(Decimal),

    #[error("Invalid quantity: {0} (must be positive)")]
    InvalidQuantity(Decimal),

    #[error("Invalid cash amount: {0} (must be positive)")]
    InvalidAmount(Decimal),

    #[error("Invalid symbol: '{0}'")]
    InvalidSymbol(String),

    #[error("Opening balance cannot be negative: {0}")]
    NegativeOpeningBalance(Decimal),
}

/// Rejections raised by the ledger when an event cannot be applied.
///
/// A rejected event leaves account and holdings untouched; callers decide
/// whether to retry, drop, or surface the event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    #[error("Insufficient shares of {symbol}: requested {requested}, held {held}")]
    InsufficientShares {
        symbol: String,
        requested: Decimal,
        held: Decimal,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Failures on the order execution path.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Brokerage connection error: {0}")]
    Connection(String),

    #[error("Order rejected by brokerage: {0}")]
    OrderRejected(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Position not found: {0}")]
    PositionNotFound(String),

    #[error("Position {id} is {status}, expected {expected}")]
    InvalidPositionState {
        id: String,
        status: String,
        expected: String,
    },

    #[error("No live price available for {0}")]
    PriceUnavailable(String),

    #[error("Position already open for {0} on this trade date")]
    DuplicatePosition(String),

    #[error("Brokerage call timed out after {0} ms")]
    Timeout(u64),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Failures raised by the portfolio reconciliation sweep.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconciliationError {
    #[error("Replay failed for account {account_id}: {source}")]
    Replay {
        account_id: String,
        #[source]
        source: LedgerError,
    },

    #[error("Correction rejected for account {account_id}: {reason}")]
    CorrectionRejected { account_id: String, reason: String },
}

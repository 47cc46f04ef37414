//! Audit records written alongside every ledger mutation.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of change the record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOperation {
    Create,
    Update,
    Delete,
    /// Written only by the reconciliation sweep when repairing drift.
    Correction,
}

impl fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditOperation::Create => "CREATE",
            AuditOperation::Update => "UPDATE",
            AuditOperation::Delete => "DELETE",
            AuditOperation::Correction => "CORRECTION",
        };
        write!(f, "{}", s)
    }
}

/// Whether the change touched a holding or only account cash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditScope {
    Account,
    Holding,
}

/// One immutable audit entry.
///
/// Cash-only events (deposits, withdrawals) are recorded at account scope
/// with the quantity fields empty; trades are recorded at holding scope with
/// before/after snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub account_id: String,
    pub scope: AuditScope,
    pub operation: AuditOperation,
    pub symbol: Option<String>,
    pub quantity_before: Option<Decimal>,
    pub quantity_after: Option<Decimal>,
    pub average_cost_before: Option<Decimal>,
    pub average_cost_after: Option<Decimal>,
    pub cash_before: Decimal,
    pub cash_after: Decimal,
    pub trade_date: NaiveDate,
    /// Sequence of the ledger event that caused the change.
    pub event_sequence: u64,
    pub note: String,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Account-scope record for a cash-only event.
    pub fn cash(
        account_id: &str,
        operation: AuditOperation,
        cash_before: Decimal,
        cash_after: Decimal,
        trade_date: NaiveDate,
        event_sequence: u64,
        note: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.to_string(),
            scope: AuditScope::Account,
            operation,
            symbol: None,
            quantity_before: None,
            quantity_after: None,
            average_cost_before: None,
            average_cost_after: None,
            cash_before,
            cash_after,
            trade_date,
            event_sequence,
            note: note.into(),
            recorded_at: Utc::now(),
        }
    }
}

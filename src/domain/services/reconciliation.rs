//! Drift detection between stored account state and the event stream.
//!
//! The event stream is the source of truth: state is replayed from scratch
//! and every divergence in the stored book is reported. Dust rows are
//! always repaired; everything else is repaired only when the sweep runs
//! with corrections approved, so the default pass is a safe dry run.

use crate::domain::entities::{
    AuditOperation, AuditRecord, AuditScope, Holding, HOLDING_EPSILON,
};
use crate::domain::errors::ReconciliationError;
use crate::domain::services::ledger::{replay, AccountBook, LedgerSnapshot};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// One divergence between the stored book and the replayed truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DriftFinding {
    /// A stored holding at or below dust that should not exist at all.
    OrphanedHolding { symbol: String, quantity: Decimal },
    /// Stored and replayed quantities disagree.
    QuantityMismatch {
        symbol: String,
        recorded: Decimal,
        replayed: Decimal,
    },
    /// Stored and replayed average costs disagree.
    AverageCostMismatch {
        symbol: String,
        recorded: Decimal,
        replayed: Decimal,
    },
    /// The stream says this holding exists but the book lost it.
    MissingHolding {
        symbol: String,
        replayed_quantity: Decimal,
    },
    /// The book carries a holding the stream never produced.
    UntrackedHolding { symbol: String, quantity: Decimal },
    /// Stored cash disagrees with the replayed balance.
    CashMismatch {
        recorded: Decimal,
        replayed: Decimal,
    },
}

/// Outcome of one sweep over one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub account_id: String,
    pub findings: Vec<DriftFinding>,
    /// Audit records written for repairs actually applied.
    pub corrections: Vec<AuditRecord>,
    pub checked_at: DateTime<Utc>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

pub struct ReconciliationSweep {
    /// When false (the default) mismatches are reported, not repaired.
    /// Orphaned dust rows are repaired either way.
    apply_corrections: bool,
}

impl Default for ReconciliationSweep {
    fn default() -> Self {
        Self {
            apply_corrections: false,
        }
    }
}

impl ReconciliationSweep {
    pub fn with_corrections_approved() -> Self {
        Self {
            apply_corrections: true,
        }
    }

    /// Replays the account's events and compares against the stored book.
    pub fn sweep(&self, book: &mut AccountBook) -> Result<ReconciliationReport, ReconciliationError> {
        let account_id = book.account.id.clone();
        let truth = replay(&account_id, &book.events).map_err(|source| {
            ReconciliationError::Replay {
                account_id: account_id.clone(),
                source,
            }
        })?;

        let mut findings = Vec::new();
        let mut corrections = Vec::new();
        let now = Utc::now();
        // Corrections cite the last event covered by the replay.
        let last_sequence = book.next_sequence().saturating_sub(1);

        self.check_cash(book, &truth, &mut findings, &mut corrections, last_sequence, now);
        self.check_holdings(book, &truth, &mut findings, &mut corrections, last_sequence, now);

        for correction in &corrections {
            book.audits.push(correction.clone());
        }
        if findings.is_empty() {
            info!(account = %account_id, "Reconciliation clean");
        } else {
            warn!(
                account = %account_id,
                findings = findings.len(),
                corrected = corrections.len(),
                "Reconciliation found drift"
            );
        }

        Ok(ReconciliationReport {
            account_id,
            findings,
            corrections,
            checked_at: now,
        })
    }

    fn check_cash(
        &self,
        book: &mut AccountBook,
        truth: &LedgerSnapshot,
        findings: &mut Vec<DriftFinding>,
        corrections: &mut Vec<AuditRecord>,
        last_sequence: u64,
        now: DateTime<Utc>,
    ) {
        if book.account.cash_balance == truth.cash_balance {
            return;
        }
        findings.push(DriftFinding::CashMismatch {
            recorded: book.account.cash_balance,
            replayed: truth.cash_balance,
        });
        if self.apply_corrections {
            let before = book.account.cash_balance;
            book.account.cash_balance = truth.cash_balance;
            corrections.push(AuditRecord::cash(
                &book.account.id,
                AuditOperation::Correction,
                before,
                truth.cash_balance,
                now.date_naive(),
                last_sequence,
                format!("cash corrected from {} to replayed {}", before, truth.cash_balance),
            ));
        }
    }

    fn check_holdings(
        &self,
        book: &mut AccountBook,
        truth: &LedgerSnapshot,
        findings: &mut Vec<DriftFinding>,
        corrections: &mut Vec<AuditRecord>,
        last_sequence: u64,
        now: DateTime<Utc>,
    ) {
        let recorded: Vec<Holding> = book.holdings.values().cloned().collect();

        for holding in recorded {
            let symbol = holding.symbol.clone();
            let replayed = truth.holdings.get(&symbol);

            // Dust rows are corruption regardless of approval; a sell
            // closed this position and deletion never happened.
            if holding.is_dust() {
                findings.push(DriftFinding::OrphanedHolding {
                    symbol: symbol.clone(),
                    quantity: holding.quantity,
                });
                book.holdings.remove(&symbol);
                corrections.push(holding_correction(
                    &book.account.id,
                    &symbol,
                    Some(&holding),
                    None,
                    last_sequence,
                    now,
                    "orphaned dust holding deleted",
                ));
                continue;
            }

            match replayed {
                None => {
                    findings.push(DriftFinding::UntrackedHolding {
                        symbol: symbol.clone(),
                        quantity: holding.quantity,
                    });
                    if self.apply_corrections {
                        book.holdings.remove(&symbol);
                        corrections.push(holding_correction(
                            &book.account.id,
                            &symbol,
                            Some(&holding),
                            None,
                            last_sequence,
                            now,
                            "holding absent from replay deleted",
                        ));
                    }
                }
                Some(expected) => {
                    let quantity_drift =
                        (holding.quantity - expected.quantity).abs() > HOLDING_EPSILON;
                    let cost_drift = holding.average_cost != expected.average_cost;
                    if quantity_drift {
                        findings.push(DriftFinding::QuantityMismatch {
                            symbol: symbol.clone(),
                            recorded: holding.quantity,
                            replayed: expected.quantity,
                        });
                    }
                    if cost_drift {
                        findings.push(DriftFinding::AverageCostMismatch {
                            symbol: symbol.clone(),
                            recorded: holding.average_cost,
                            replayed: expected.average_cost,
                        });
                    }
                    if (quantity_drift || cost_drift) && self.apply_corrections {
                        book.holdings.insert(symbol.clone(), expected.clone());
                        corrections.push(holding_correction(
                            &book.account.id,
                            &symbol,
                            Some(&holding),
                            Some(expected),
                            last_sequence,
                            now,
                            "holding reset to replayed state",
                        ));
                    }
                }
            }
        }

        for (symbol, expected) in &truth.holdings {
            if book.holdings.contains_key(symbol) {
                continue;
            }
            // Dust in the replay itself would have been deleted by apply.
            findings.push(DriftFinding::MissingHolding {
                symbol: symbol.clone(),
                replayed_quantity: expected.quantity,
            });
            if self.apply_corrections {
                book.holdings.insert(symbol.clone(), expected.clone());
                corrections.push(holding_correction(
                    &book.account.id,
                    symbol,
                    None,
                    Some(expected),
                    last_sequence,
                    now,
                    "missing holding restored from replay",
                ));
            }
        }
    }
}

fn holding_correction(
    account_id: &str,
    symbol: &str,
    before: Option<&Holding>,
    after: Option<&Holding>,
    last_sequence: u64,
    now: DateTime<Utc>,
    note: &str,
) -> AuditRecord {
    AuditRecord {
        account_id: account_id.to_string(),
        scope: AuditScope::Holding,
        operation: AuditOperation::Correction,
        symbol: Some(symbol.to_string()),
        quantity_before: before.map(|h| h.quantity),
        quantity_after: after.map(|h| h.quantity),
        average_cost_before: before.map(|h| h.average_cost),
        average_cost_after: after.map(|h| h.average_cost),
        cash_before: Decimal::ZERO,
        cash_after: Decimal::ZERO,
        trade_date: now.date_naive(),
        event_sequence: last_sequence,
        note: note.to_string(),
        recorded_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Account, LedgerEvent};
    use crate::domain::value_objects::{Price, Quantity};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    fn traded_book() -> AccountBook {
        let mut book = AccountBook::new(Account::new("acct-1", dec!(0)).unwrap());
        book.apply_event(LedgerEvent::deposit(dec!(10000), day(), 0).unwrap())
            .unwrap();
        book.apply_event(
            LedgerEvent::buy(
                "AAPL",
                Quantity::new(dec!(10)).unwrap(),
                Price::new(dec!(100)).unwrap(),
                day(),
                1,
            )
            .unwrap(),
        )
        .unwrap();
        book
    }

    #[test]
    fn clean_book_produces_a_clean_report() {
        let mut book = traded_book();
        let report = ReconciliationSweep::default().sweep(&mut book).unwrap();
        assert!(report.is_clean());
        assert!(report.corrections.is_empty());
    }

    #[test]
    fn dust_holding_is_deleted_even_in_dry_run() {
        let mut book = traded_book();
        // Sell everything, then resurrect a dust row as stale state.
        book.apply_event(
            LedgerEvent::sell(
                "AAPL",
                Quantity::new(dec!(10)).unwrap(),
                Price::new(dec!(110)).unwrap(),
                day(),
                2,
            )
            .unwrap(),
        )
        .unwrap();
        book.holdings.insert(
            "AAPL".to_string(),
            Holding {
                symbol: "AAPL".to_string(),
                quantity: dec!(0.00005),
                average_cost: dec!(100),
                first_acquired: day(),
            },
        );

        let report = ReconciliationSweep::default().sweep(&mut book).unwrap();

        assert!(matches!(
            report.findings[0],
            DriftFinding::OrphanedHolding { .. }
        ));
        assert!(book.holdings.is_empty());
        assert_eq!(report.corrections.len(), 1);
        assert_eq!(report.corrections[0].operation, AuditOperation::Correction);
        assert_eq!(report.corrections[0].quantity_after, None);
    }

    #[test]
    fn quantity_drift_is_reported_but_not_repaired_by_default() {
        let mut book = traded_book();
        if let Some(h) = book.holdings.get_mut("AAPL") {
            h.quantity = dec!(12);
        }

        let report = ReconciliationSweep::default().sweep(&mut book).unwrap();

        assert_eq!(
            report.findings,
            vec![DriftFinding::QuantityMismatch {
                symbol: "AAPL".to_string(),
                recorded: dec!(12),
                replayed: dec!(10),
            }]
        );
        assert!(report.corrections.is_empty());
        assert_eq!(book.holdings["AAPL"].quantity, dec!(12));
    }

    #[test]
    fn approved_sweep_repairs_quantity_drift() {
        let mut book = traded_book();
        if let Some(h) = book.holdings.get_mut("AAPL") {
            h.quantity = dec!(12);
        }

        let report = ReconciliationSweep::with_corrections_approved()
            .sweep(&mut book)
            .unwrap();

        assert_eq!(report.corrections.len(), 1);
        assert_eq!(book.holdings["AAPL"].quantity, dec!(10));
        assert_eq!(report.corrections[0].quantity_before, Some(dec!(12)));
        assert_eq!(report.corrections[0].quantity_after, Some(dec!(10)));
    }

    #[test]
    fn cash_drift_repair_requires_approval() {
        let mut book = traded_book();
        book.account.cash_balance = dec!(8000);

        let dry = ReconciliationSweep::default().sweep(&mut book).unwrap();
        assert_eq!(
            dry.findings,
            vec![DriftFinding::CashMismatch {
                recorded: dec!(8000),
                replayed: dec!(9000),
            }]
        );
        assert_eq!(book.account.cash_balance, dec!(8000));

        ReconciliationSweep::with_corrections_approved()
            .sweep(&mut book)
            .unwrap();
        assert_eq!(book.account.cash_balance, dec!(9000));
    }

    #[test]
    fn missing_holding_is_restored_when_approved() {
        let mut book = traded_book();
        book.holdings.clear();

        let report = ReconciliationSweep::with_corrections_approved()
            .sweep(&mut book)
            .unwrap();

        assert!(matches!(
            report.findings[0],
            DriftFinding::MissingHolding { .. }
        ));
        assert_eq!(book.holdings["AAPL"].quantity, dec!(10));
        assert_eq!(book.holdings["AAPL"].average_cost, dec!(100));
    }

    #[test]
    fn untracked_holding_is_flagged() {
        let mut book = traded_book();
        book.holdings.insert(
            "GHOST".to_string(),
            Holding {
                symbol: "GHOST".to_string(),
                quantity: dec!(5),
                average_cost: dec!(50),
                first_acquired: day(),
            },
        );

        let report = ReconciliationSweep::default().sweep(&mut book).unwrap();
        assert_eq!(
            report.findings,
            vec![DriftFinding::UntrackedHolding {
                symbol: "GHOST".to_string(),
                quantity: dec!(5),
            }]
        );
        // Dry run: the ghost stays until an operator approves.
        assert!(book.holdings.contains_key("GHOST"));
    }

    #[test]
    fn corrupt_stream_surfaces_a_replay_error() {
        let mut book = traded_book();
        // Tamper with the stream so it can no longer replay.
        book.events.push(
            LedgerEvent::sell(
                "MSFT",
                Quantity::new(dec!(1)).unwrap(),
                Price::new(dec!(10)).unwrap(),
                day(),
                3,
            )
            .unwrap(),
        );
        let err = ReconciliationSweep::default().sweep(&mut book).unwrap_err();
        assert!(matches!(err, ReconciliationError::Replay { .. }));
    }
}

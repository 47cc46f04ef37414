//! Ledger core: the pure apply function, full replay, and the per-account
//! book that commits outcomes.
//!
//! `apply` is the only place business rules for cash and holdings live.
//! It is all-or-nothing: a rejected event changes nothing, an accepted event
//! yields a new account, at most one holding change, and exactly one audit
//! record. Callers (the account actor, the replay, the reconciliation
//! sweep) load state, call `apply`, and persist the outcome.

use crate::domain::entities::{
    Account, AuditOperation, AuditRecord, AuditScope, BrokerOrder, DayTradePosition, Holding,
    LedgerEvent, LedgerEventKind, PositionStatus,
};
use crate::domain::errors::LedgerError;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::info;

/// Holding-side effect of applying one event.
#[derive(Debug, Clone, PartialEq)]
pub enum HoldingChange {
    Created(Holding),
    Updated(Holding),
    /// The holding was sold down to dust (or exactly zero) and is deleted.
    Deleted,
    /// Cash-only event; holdings untouched.
    Unchanged,
}

/// Everything a successful apply produces.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerOutcome {
    pub account: Account,
    pub holding: HoldingChange,
    pub audit: AuditRecord,
}

/// Applies one event to the account and (for trades) its holding in that
/// symbol.
///
/// # Errors
///
/// `InsufficientFunds` when a withdrawal or buy exceeds available cash,
/// `InsufficientShares` when a sell exceeds the held quantity. Both leave
/// the inputs untouched.
pub fn apply(
    account: &Account,
    holding: Option<&Holding>,
    event: &LedgerEvent,
) -> Result<LedgerOutcome, LedgerError> {
    match &event.kind {
        LedgerEventKind::Deposit { amount } => {
            let mut updated = account.clone();
            updated.cash_balance += amount;
            let audit = AuditRecord::cash(
                &account.id,
                AuditOperation::Update,
                account.cash_balance,
                updated.cash_balance,
                event.trade_date,
                event.sequence,
                format!("DEPOSIT {}", amount),
            );
            Ok(LedgerOutcome {
                account: updated,
                holding: HoldingChange::Unchanged,
                audit,
            })
        }
        LedgerEventKind::Withdrawal { amount } => {
            if *amount > account.cash_balance {
                return Err(LedgerError::InsufficientFunds {
                    required: *amount,
                    available: account.cash_balance,
                });
            }
            let mut updated = account.clone();
            updated.cash_balance -= amount;
            let audit = AuditRecord::cash(
                &account.id,
                AuditOperation::Update,
                account.cash_balance,
                updated.cash_balance,
                event.trade_date,
                event.sequence,
                format!("WITHDRAWAL {}", amount),
            );
            Ok(LedgerOutcome {
                account: updated,
                holding: HoldingChange::Unchanged,
                audit,
            })
        }
        LedgerEventKind::Buy {
            symbol,
            quantity,
            price,
        } => {
            let quantity = quantity.value();
            let price = price.value();
            let cost = quantity * price;
            if cost > account.cash_balance {
                return Err(LedgerError::InsufficientFunds {
                    required: cost,
                    available: account.cash_balance,
                });
            }
            let mut updated = account.clone();
            updated.cash_balance -= cost;

            let (next, operation) = match holding {
                Some(existing) => {
                    let new_quantity = existing.quantity + quantity;
                    // Weighted average cost across the old lot and this fill.
                    let new_cost =
                        (existing.quantity * existing.average_cost + cost) / new_quantity;
                    (
                        Holding {
                            symbol: symbol.clone(),
                            quantity: new_quantity,
                            average_cost: new_cost,
                            first_acquired: existing.first_acquired,
                        },
                        AuditOperation::Update,
                    )
                }
                None => (
                    Holding {
                        symbol: symbol.clone(),
                        quantity,
                        average_cost: price,
                        first_acquired: event.trade_date,
                    },
                    AuditOperation::Create,
                ),
            };

            let audit = AuditRecord {
                account_id: account.id.clone(),
                scope: AuditScope::Holding,
                operation,
                symbol: Some(symbol.clone()),
                quantity_before: holding.map(|h| h.quantity),
                quantity_after: Some(next.quantity),
                average_cost_before: holding.map(|h| h.average_cost),
                average_cost_after: Some(next.average_cost),
                cash_before: account.cash_balance,
                cash_after: updated.cash_balance,
                trade_date: event.trade_date,
                event_sequence: event.sequence,
                note: format!("BUY {} {} @ {}", quantity, symbol, price),
                recorded_at: Utc::now(),
            };
            let change = match operation {
                AuditOperation::Create => HoldingChange::Created(next),
                _ => HoldingChange::Updated(next),
            };
            Ok(LedgerOutcome {
                account: updated,
                holding: change,
                audit,
            })
        }
        LedgerEventKind::Sell {
            symbol,
            quantity,
            price,
        } => {
            let quantity = quantity.value();
            let price = price.value();
            let held = holding.map(|h| h.quantity).unwrap_or(Decimal::ZERO);
            if quantity > held {
                return Err(LedgerError::InsufficientShares {
                    symbol: symbol.clone(),
                    requested: quantity,
                    held,
                });
            }
            // quantity <= held, so holding is present here
            let existing = holding.ok_or_else(|| LedgerError::InsufficientShares {
                symbol: symbol.clone(),
                requested: quantity,
                held,
            })?;

            let mut updated = account.clone();
            updated.cash_balance += quantity * price;

            let remaining = existing.quantity - quantity;
            let next = Holding {
                symbol: symbol.clone(),
                quantity: remaining,
                // Selling realizes P&L; the cost of the remaining lot is
                // unchanged per the weighted-average method.
                average_cost: existing.average_cost,
                first_acquired: existing.first_acquired,
            };
            let deleted = next.is_dust();
            let operation = if deleted {
                AuditOperation::Delete
            } else {
                AuditOperation::Update
            };

            let audit = AuditRecord {
                account_id: account.id.clone(),
                scope: AuditScope::Holding,
                operation,
                symbol: Some(symbol.clone()),
                quantity_before: Some(existing.quantity),
                quantity_after: Some(if deleted { Decimal::ZERO } else { remaining }),
                average_cost_before: Some(existing.average_cost),
                average_cost_after: if deleted {
                    None
                } else {
                    Some(existing.average_cost)
                },
                cash_before: account.cash_balance,
                cash_after: updated.cash_balance,
                trade_date: event.trade_date,
                event_sequence: event.sequence,
                note: format!("SELL {} {} @ {}", quantity, symbol, price),
                recorded_at: Utc::now(),
            };
            let change = if deleted {
                HoldingChange::Deleted
            } else {
                HoldingChange::Updated(next)
            };
            Ok(LedgerOutcome {
                account: updated,
                holding: change,
                audit,
            })
        }
    }
}

/// Account state derived purely from an event stream.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSnapshot {
    pub cash_balance: Decimal,
    pub holdings: HashMap<String, Holding>,
}

/// Rebuilds account state from scratch by applying every event in
/// `(trade_date, sequence)` order.
///
/// This is the definition of truth the reconciliation sweep compares stored
/// state against. A stream that cannot replay cleanly (e.g. a sell with no
/// prior buy) is itself corrupt and surfaces as an error.
pub fn replay(account_id: &str, events: &[LedgerEvent]) -> Result<LedgerSnapshot, LedgerError> {
    let mut ordered: Vec<&LedgerEvent> = events.iter().collect();
    ordered.sort_by_key(|e| e.ordering_key());

    let mut account = Account {
        id: account_id.to_string(),
        cash_balance: Decimal::ZERO,
        brokerage: Default::default(),
        risk: Default::default(),
    };
    let mut holdings: HashMap<String, Holding> = HashMap::new();

    for event in ordered {
        let holding = event.symbol().and_then(|s| holdings.get(s));
        let outcome = apply(&account, holding, event)?;
        account = outcome.account;
        match outcome.holding {
            HoldingChange::Created(h) | HoldingChange::Updated(h) => {
                holdings.insert(h.symbol.clone(), h);
            }
            HoldingChange::Deleted => {
                if let Some(symbol) = event.symbol() {
                    holdings.remove(symbol);
                }
            }
            HoldingChange::Unchanged => {}
        }
    }

    Ok(LedgerSnapshot {
        cash_balance: account.cash_balance,
        holdings,
    })
}

/// All mutable state of one account, owned by its single-writer actor.
///
/// Orders and positions ride along with the ledger so every mutation is
/// serialized through one owner.
#[derive(Debug, Clone)]
pub struct AccountBook {
    pub account: Account,
    pub holdings: HashMap<String, Holding>,
    pub events: Vec<LedgerEvent>,
    pub audits: Vec<AuditRecord>,
    pub orders: HashMap<String, BrokerOrder>,
    pub positions: HashMap<String, DayTradePosition>,
    next_sequence: u64,
}

impl AccountBook {
    pub fn new(account: Account) -> Self {
        Self {
            account,
            holdings: HashMap::new(),
            events: Vec::new(),
            audits: Vec::new(),
            orders: HashMap::new(),
            positions: HashMap::new(),
            next_sequence: 0,
        }
    }

    /// Sequence number the next event should carry.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Applies an event and commits the outcome into the book.
    pub fn apply_event(&mut self, event: LedgerEvent) -> Result<AuditRecord, LedgerError> {
        let holding = event.symbol().and_then(|s| self.holdings.get(s));
        let outcome = apply(&self.account, holding, &event)?;

        info!(
            account = %self.account.id,
            event = %event.kind,
            sequence = event.sequence,
            cash = %outcome.account.cash_balance,
            "Applied ledger event"
        );

        self.account = outcome.account;
        match outcome.holding {
            HoldingChange::Created(h) | HoldingChange::Updated(h) => {
                self.holdings.insert(h.symbol.clone(), h);
            }
            HoldingChange::Deleted => {
                if let Some(symbol) = event.symbol() {
                    self.holdings.remove(symbol);
                }
            }
            HoldingChange::Unchanged => {}
        }
        self.next_sequence = self.next_sequence.max(event.sequence + 1);
        self.events.push(event);
        self.audits.push(outcome.audit.clone());
        Ok(outcome.audit)
    }

    /// Orders the reconciliation sweep should poll.
    pub fn active_orders(&self) -> Vec<&BrokerOrder> {
        self.orders.values().filter(|o| o.status.is_active()).collect()
    }

    /// Positions the monitor should evaluate.
    pub fn open_positions(&self) -> Vec<&DayTradePosition> {
        self.positions
            .values()
            .filter(|p| p.status == PositionStatus::Open)
            .collect()
    }
}

//! Ledger events, the append-only source of truth for account state.

use crate::domain::errors::ValidationError;
use crate::domain::value_objects::{Price, Quantity};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// What a ledger event does to the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEventKind {
    Deposit { amount: Decimal },
    Withdrawal { amount: Decimal },
    Buy { symbol: String, quantity: Quantity, price: Price },
    Sell { symbol: String, quantity: Quantity, price: Price },
}

impl fmt::Display for LedgerEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerEventKind::Deposit { .. } => write!(f, "DEPOSIT"),
            LedgerEventKind::Withdrawal { .. } => write!(f, "WITHDRAWAL"),
            LedgerEventKind::Buy { .. } => write!(f, "BUY"),
            LedgerEventKind::Sell { .. } => write!(f, "SELL"),
        }
    }
}

/// A single immutable ledger entry.
///
/// Events are totally ordered by `(trade_date, sequence)`; the sequence
/// number disambiguates same-day events. Replaying all events of an account
/// in this order reproduces its cash balance and holdings exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub kind: LedgerEventKind,
    pub trade_date: NaiveDate,
    pub sequence: u64,
    /// Free-form annotation, e.g. the client order id that produced a fill.
    pub note: Option<String>,
}

impl LedgerEvent {
    pub fn deposit(
        amount: Decimal,
        trade_date: NaiveDate,
        sequence: u64,
    ) -> Result<Self, ValidationError> {
        if amount <= Decimal::ZERO {
            return Err(ValidationError::InvalidAmount(amount));
        }
        Ok(Self {
            kind: LedgerEventKind::Deposit { amount },
            trade_date,
            sequence,
            note: None,
        })
    }

    pub fn withdrawal(
        amount: Decimal,
        trade_date: NaiveDate,
        sequence: u64,
    ) -> Result<Self, ValidationError> {
        if amount <= Decimal::ZERO {
            return Err(ValidationError::InvalidAmount(amount));
        }
        Ok(Self {
            kind: LedgerEventKind::Withdrawal { amount },
            trade_date,
            sequence,
            note: None,
        })
    }

    pub fn buy(
        symbol: &str,
        quantity: Quantity,
        price: Price,
        trade_date: NaiveDate,
        sequence: u64,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            kind: LedgerEventKind::Buy {
                symbol: validated_symbol(symbol)?,
                quantity,
                price,
            },
            trade_date,
            sequence,
            note: None,
        })
    }

    pub fn sell(
        symbol: &str,
        quantity: Quantity,
        price: Price,
        trade_date: NaiveDate,
        sequence: u64,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            kind: LedgerEventKind::Sell {
                symbol: validated_symbol(symbol)?,
                quantity,
                price,
            },
            trade_date,
            sequence,
            note: None,
        })
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// The symbol this event touches, if it is a trade.
    pub fn symbol(&self) -> Option<&str> {
        match &self.kind {
            LedgerEventKind::Buy { symbol, .. } | LedgerEventKind::Sell { symbol, .. } => {
                Some(symbol)
            }
            _ => None,
        }
    }

    /// Total ordering key: trade date first, then intra-day sequence.
    pub fn ordering_key(&self) -> (NaiveDate, u64) {
        (self.trade_date, self.sequence)
    }
}

impl PartialOrd for LedgerEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LedgerEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordering_key().cmp(&other.ordering_key())
    }
}

fn validated_symbol(symbol: &str) -> Result<String, ValidationError> {
    let trimmed = symbol.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidSymbol(symbol.to_string()));
    }
    Ok(trimmed.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    #[test]
    fn deposit_rejects_non_positive_amount() {
        assert!(LedgerEvent::deposit(Decimal::ZERO, day(1), 0).is_err());
        assert!(LedgerEvent::deposit(dec!(-100), day(1), 0).is_err());
    }

    #[test]
    fn buy_normalizes_symbol() {
        let event = LedgerEvent::buy(
            " aapl ",
            Quantity::new(dec!(10)).unwrap(),
            Price::new(dec!(100)).unwrap(),
            day(1),
            0,
        )
        .unwrap();
        assert_eq!(event.symbol(), Some("AAPL"));
    }

    #[test]
    fn events_order_by_date_then_sequence() {
        let a = LedgerEvent::deposit(dec!(1), day(1), 5).unwrap();
        let b = LedgerEvent::deposit(dec!(1), day(2), 0).unwrap();
        let c = LedgerEvent::deposit(dec!(1), day(1), 2).unwrap();
        let mut events = vec![a.clone(), b.clone(), c.clone()];
        events.sort();
        assert_eq!(events, vec![c, a, b]);
    }
}

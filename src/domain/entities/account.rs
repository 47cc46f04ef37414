//! Trading account entity.

use crate::config::{BrokerageSettings, RiskConfig};
use crate::domain::errors::{LedgerError, ValidationError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A trading account: cash plus per-account configuration.
///
/// Cash moves through exactly two doors: the ledger's apply function, and
/// the explicit reservation window around a submitted buy order. Everything
/// else treats the balance as read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub cash_balance: Decimal,
    pub brokerage: BrokerageSettings,
    pub risk: RiskConfig,
}

impl Account {
    pub fn new(id: &str, opening_cash: Decimal) -> Result<Self, ValidationError> {
        if opening_cash < Decimal::ZERO {
            return Err(ValidationError::NegativeOpeningBalance(opening_cash));
        }
        Ok(Self {
            id: id.to_string(),
            cash_balance: opening_cash,
            brokerage: BrokerageSettings::default(),
            risk: RiskConfig::default(),
        })
    }

    pub fn with_brokerage(mut self, brokerage: BrokerageSettings) -> Self {
        self.brokerage = brokerage;
        self
    }

    pub fn with_risk(mut self, risk: RiskConfig) -> Self {
        self.risk = risk;
        self
    }

    /// Sets cash aside for an order about to be submitted.
    ///
    /// Fails without touching the balance when cash does not cover the
    /// estimate; the caller must not submit in that case.
    pub fn reserve_cash(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        if amount > self.cash_balance {
            return Err(LedgerError::InsufficientFunds {
                required: amount,
                available: self.cash_balance,
            });
        }
        self.cash_balance -= amount;
        debug!(
            account = %self.id,
            reserved = %amount,
            remaining = %self.cash_balance,
            "Reserved cash for order"
        );
        Ok(())
    }

    /// Returns previously reserved cash to the balance.
    pub fn release_cash(&mut self, amount: Decimal) {
        self.cash_balance += amount;
        debug!(
            account = %self.id,
            released = %amount,
            balance = %self.cash_balance,
            "Released reserved cash"
        );
    }
}

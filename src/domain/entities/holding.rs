//! A derived holding: quantity and weighted average cost per symbol.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Quantities at or below this are treated as fully closed out. Fractional
/// share bookkeeping can leave dust like 0.00004999 behind.
pub const HOLDING_EPSILON: Decimal = dec!(0.0001);

/// Current position in one symbol, derived from the ledger.
///
/// Never mutated directly; the ledger's apply function produces updated
/// copies. Average cost uses the weighted-average method and is unchanged
/// by sells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub quantity: Decimal,
    pub average_cost: Decimal,
    pub first_acquired: NaiveDate,
}

impl Holding {
    pub fn cost_basis(&self) -> Decimal {
        self.quantity * self.average_cost
    }

    /// True when the residual quantity is dust that should be deleted.
    pub fn is_dust(&self) -> bool {
        self.quantity <= HOLDING_EPSILON
    }
}

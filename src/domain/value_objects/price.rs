//! Price value object.

use crate::domain::errors::ValidationError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A strictly positive price, stored as a fixed-point decimal.
///
/// All monetary arithmetic in the engine goes through `Decimal`; binary
/// floating point is confined to the scoring math, which never touches cash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Price(Decimal);

impl Price {
    /// Creates a price, rejecting zero and negative values.
    pub fn new(value: Decimal) -> Result<Self, ValidationError> {
        if value > Decimal::ZERO {
            Ok(Price(value))
        } else {
            Err(ValidationError::InvalidPrice(value))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//! Quantity value object.

use crate::domain::errors::ValidationError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A strictly positive share quantity.
///
/// Fractional quantities are allowed; they are rounded to four decimal
/// places, the engine-wide share precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(Decimal);

impl Quantity {
    /// Share quantities carry four decimal places.
    pub const SCALE: u32 = 4;

    /// Creates a quantity, rejecting zero and negative values.
    pub fn new(value: Decimal) -> Result<Self, ValidationError> {
        if value > Decimal::ZERO {
            Ok(Quantity(value.round_dp(Self::SCALE)))
        } else {
            Err(ValidationError::InvalidQuantity(value))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

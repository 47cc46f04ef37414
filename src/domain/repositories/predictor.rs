//! Prediction model port.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One symbol's model output for a trade date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Expected close-to-close return as a fraction, e.g. 0.01 for +1%.
    pub predicted_return: f64,
    /// Recent return volatility, when the model provides it.
    pub volatility: Option<f64>,
    /// Average true range in price units, when available.
    pub atr: Option<f64>,
    /// Prior session close, used as the reference entry price.
    pub prior_close: Decimal,
}

/// Produces per-symbol predictions for a trade date.
#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(&self, symbol: &str, trade_date: NaiveDate) -> Option<Prediction>;
}

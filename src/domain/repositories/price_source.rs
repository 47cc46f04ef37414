//! Live price port.

use crate::domain::value_objects::Price;
use async_trait::async_trait;

/// Source of live (or delayed) market prices.
///
/// Returns `None` when no quote is available; callers decide whether to
/// fall back or skip.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn live_price(&self, symbol: &str) -> Option<Price>;
}

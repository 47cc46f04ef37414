//! Pre-market recommendation engine: scoring, stops, targets, sizing.
//!
//! Scoring runs in `f64`; it only ranks candidates and never touches the
//! ledger. Everything that becomes money (prices, shares, cost estimates)
//! is converted to `Decimal` before leaving this module.

use crate::config::{MarketRegime, RiskConfig};
use crate::domain::repositories::Prediction;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Estimated slippage on a market order, as a fraction of price (5 bps).
pub const SLIPPAGE_RATE: Decimal = dec!(0.0005);
/// Commission per share, with a minimum per order.
pub const COMMISSION_PER_SHARE: Decimal = dec!(0.0035);
pub const MIN_COMMISSION: Decimal = dec!(0.35);
/// Stop distance fallback when no ATR is available: 1.5% of entry.
const ATR_FALLBACK_FRACTION: f64 = 0.015;

/// A sized, scored trade the engine proposes for today.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeCandidate {
    pub symbol: String,
    pub confidence_score: f64,
    pub predicted_return: f64,
    pub entry_price: Decimal,
    pub target_price: Decimal,
    pub stop_price: Decimal,
    pub shares: Decimal,
    /// Entry cost including slippage and commission; what gets reserved.
    pub estimated_cost: Decimal,
}

/// Expected commission for a fill of `shares`.
pub fn estimated_commission(shares: Decimal) -> Decimal {
    (shares * COMMISSION_PER_SHARE).max(MIN_COMMISSION)
}

/// Entry cost estimate: shares at entry plus slippage, plus commission.
pub fn estimated_entry_cost(shares: Decimal, entry_price: Decimal) -> Decimal {
    (shares * entry_price * (Decimal::ONE + SLIPPAGE_RATE) + estimated_commission(shares))
        .round_dp(2)
}

pub struct RecommendationEngine {
    risk: RiskConfig,
}

impl RecommendationEngine {
    pub fn new(risk: RiskConfig) -> Self {
        Self { risk }
    }

    /// Maps a predicted return to a 0-100 confidence score.
    ///
    /// With volatility available the score is a sigmoid of the
    /// volatility-normalized return, so the same 1% prediction scores
    /// higher in a quiet name than in a wild one. Without volatility a
    /// linear approximation is used: 1% maps to 100.
    pub fn confidence_score(predicted_return: f64, volatility: Option<f64>) -> f64 {
        match volatility {
            Some(vol) if vol > 0.0 => {
                let normalized = predicted_return / vol;
                100.0 / (1.0 + (-5.0 * normalized).exp())
            }
            _ => (50.0 + 5000.0 * predicted_return).clamp(0.0, 100.0),
        }
    }

    /// Stop and target prices for an entry, both rounded to cents.
    ///
    /// Stop distance is the wider of 1% and two ATRs; the target is the
    /// wider of 1.5x the stop distance and 1.2x the predicted move, so
    /// reward exceeds risk whenever the model is right.
    pub fn stop_and_target(
        entry_price: Decimal,
        prediction: &Prediction,
    ) -> Option<(Decimal, Decimal)> {
        let entry = entry_price.to_f64()?;
        if entry <= 0.0 {
            return None;
        }
        let atr = prediction.atr.filter(|a| *a > 0.0).unwrap_or(ATR_FALLBACK_FRACTION * entry);
        let stop_fraction = (2.0 * atr / entry).max(0.01);
        let target_fraction = (1.5 * stop_fraction).max(1.2 * prediction.predicted_return.abs());

        let stop = Decimal::from_f64_retain(entry * (1.0 - stop_fraction))?.round_dp(2);
        let target = Decimal::from_f64_retain(entry * (1.0 + target_fraction))?.round_dp(2);
        if stop <= Decimal::ZERO || stop >= entry_price || target <= entry_price {
            return None;
        }
        Some((stop, target))
    }

    /// Number of shares to buy, bounded by the allocation cap and the
    /// per-trade risk budget. Returns zero when the candidate is too small.
    pub fn size_position(
        &self,
        available_cash: Decimal,
        entry_price: Decimal,
        stop_price: Decimal,
    ) -> Decimal {
        let risk_per_share = entry_price - stop_price;
        if risk_per_share <= Decimal::ZERO || entry_price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        // Cash split evenly across the position budget caps the allocation
        // alongside the per-position percentage.
        let per_slot = available_cash / Decimal::from(self.risk.max_positions.max(1) as u64);
        let allocation = (available_cash * self.risk.max_position_percent).min(per_slot);
        let by_allocation = allocation / entry_price;
        let by_risk = available_cash * self.risk.per_trade_risk_fraction / risk_per_share;
        let raw = by_allocation.min(by_risk);

        let shares = if self.risk.allow_fractional_shares {
            raw.round_dp_with_strategy(4, rust_decimal::RoundingStrategy::ToZero)
        } else {
            raw.floor()
        };
        if shares < Decimal::ONE {
            return Decimal::ZERO;
        }
        shares
    }

    /// Turns predictions into sized candidates: score, threshold, rank,
    /// size, and keep at most `max_positions`.
    pub fn generate(
        &self,
        available_cash: Decimal,
        predictions: &[(String, Prediction)],
        regime: Option<MarketRegime>,
    ) -> Vec<TradeCandidate> {
        let threshold = self.risk.confidence_threshold(regime);
        let mut candidates: Vec<TradeCandidate> = Vec::new();

        for (symbol, prediction) in predictions {
            if prediction.predicted_return <= 0.0 {
                debug!(%symbol, predicted_return = prediction.predicted_return, "Non-positive prediction, skipped");
                continue;
            }
            let confidence =
                Self::confidence_score(prediction.predicted_return, prediction.volatility);
            if confidence < threshold {
                debug!(%symbol, confidence, threshold, "Below confidence threshold, skipped");
                continue;
            }
            let entry_price = prediction.prior_close;
            let Some((stop_price, target_price)) = Self::stop_and_target(entry_price, prediction)
            else {
                debug!(%symbol, "No usable stop/target, skipped");
                continue;
            };
            let shares = self.size_position(available_cash, entry_price, stop_price);
            if shares.is_zero() {
                debug!(%symbol, "Sized below one share, skipped");
                continue;
            }
            candidates.push(TradeCandidate {
                symbol: symbol.clone(),
                confidence_score: confidence,
                predicted_return: prediction.predicted_return,
                entry_price,
                target_price,
                stop_price,
                shares,
                estimated_cost: estimated_entry_cost(shares, entry_price),
            });
        }

        candidates.sort_by(|a, b| {
            b.confidence_score
                .partial_cmp(&a.confidence_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(self.risk.max_positions);
        candidates
    }
}

//! Engine configuration.
//!
//! Everything tunable is read from environment variables with sane defaults,
//! so a bare process starts in paper mode without any setup. Invalid values
//! log a warning and fall back to the default rather than aborting.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use tracing::warn;

/// Broad market regime used to pick a confidence threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketRegime {
    BullTrending,
    BearTrending,
    HighVolatility,
    LowVolatility,
    Ranging,
}

/// Risk and sizing limits applied when generating trade candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Maximum fraction of cash a single position may take (default 0.25).
    pub max_position_percent: Decimal,
    /// Fraction of cash risked per trade, measured entry-to-stop (default 0.02).
    pub per_trade_risk_fraction: Decimal,
    /// Maximum number of simultaneously recommended positions.
    pub max_positions: usize,
    /// Whether share quantities may be fractional.
    pub allow_fractional_shares: bool,
    /// Confidence threshold when no regime override applies (default 60).
    pub default_confidence_threshold: f64,
    /// Per-regime overrides of the confidence threshold.
    pub regime_thresholds: HashMap<MarketRegime, f64>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        let mut regime_thresholds = HashMap::new();
        regime_thresholds.insert(MarketRegime::BullTrending, 55.0);
        regime_thresholds.insert(MarketRegime::BearTrending, 70.0);
        regime_thresholds.insert(MarketRegime::HighVolatility, 68.0);
        regime_thresholds.insert(MarketRegime::LowVolatility, 58.0);
        regime_thresholds.insert(MarketRegime::Ranging, 62.0);
        Self {
            max_position_percent: dec!(0.25),
            per_trade_risk_fraction: dec!(0.02),
            max_positions: 50,
            allow_fractional_shares: false,
            default_confidence_threshold: 60.0,
            regime_thresholds,
        }
    }
}

impl RiskConfig {
    /// Loads risk limits from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_position_percent: env_decimal(
                "INTRADAY_MAX_POSITION_PERCENT",
                defaults.max_position_percent,
            ),
            per_trade_risk_fraction: env_decimal(
                "INTRADAY_PER_TRADE_RISK",
                defaults.per_trade_risk_fraction,
            ),
            max_positions: env_parse("INTRADAY_MAX_POSITIONS", defaults.max_positions),
            allow_fractional_shares: env_parse(
                "INTRADAY_FRACTIONAL_SHARES",
                defaults.allow_fractional_shares,
            ),
            default_confidence_threshold: env_parse(
                "INTRADAY_CONFIDENCE_THRESHOLD",
                defaults.default_confidence_threshold,
            ),
            regime_thresholds: defaults.regime_thresholds,
        }
    }

    /// Confidence threshold for a given regime, if known.
    pub fn confidence_threshold(&self, regime: Option<MarketRegime>) -> f64 {
        regime
            .and_then(|r| self.regime_thresholds.get(&r).copied())
            .unwrap_or(self.default_confidence_threshold)
    }
}

/// Connection settings for a brokerage gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerageSettings {
    /// When false the account trades in simulated (paper) mode only.
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub client_id: i32,
    /// Brokerage-side account identifier, when it differs from ours.
    pub broker_account: Option<String>,
}

impl Default for BrokerageSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 7497,
            client_id: 1,
            broker_account: None,
        }
    }
}

impl BrokerageSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: env_parse("BROKERAGE_ENABLED", defaults.enabled),
            host: env::var("BROKERAGE_HOST").unwrap_or(defaults.host),
            port: env_parse("BROKERAGE_PORT", defaults.port),
            client_id: env_parse("BROKERAGE_CLIENT_ID", defaults.client_id),
            broker_account: env::var("BROKERAGE_ACCOUNT").ok(),
        }
    }
}

/// Scheduling and timeout knobs for the background loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between order reconciliation sweeps.
    pub order_sweep_interval_secs: u64,
    /// Seconds between position monitor passes.
    pub monitor_interval_secs: u64,
    /// Age in seconds after which an unfilled SUBMITTED order is cancelled.
    pub stale_order_timeout_secs: u64,
    /// Upper bound on any single brokerage call, in milliseconds.
    pub broker_call_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            order_sweep_interval_secs: 30,
            monitor_interval_secs: 60,
            stale_order_timeout_secs: 600,
            broker_call_timeout_ms: 10_000,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Self {
            order_sweep_interval_secs: env_parse(
                "INTRADAY_SWEEP_INTERVAL_SECS",
                defaults.order_sweep_interval_secs,
            ),
            monitor_interval_secs: env_parse(
                "INTRADAY_MONITOR_INTERVAL_SECS",
                defaults.monitor_interval_secs,
            ),
            stale_order_timeout_secs: env_parse(
                "INTRADAY_STALE_ORDER_SECS",
                defaults.stale_order_timeout_secs,
            ),
            broker_call_timeout_ms: env_parse(
                "INTRADAY_BROKER_TIMEOUT_MS",
                defaults.broker_call_timeout_ms,
            ),
        }
    }
}

fn env_parse<T: std::str::FromStr + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Invalid {}='{}', using default {}", key, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}

fn env_decimal(key: &str, default: Decimal) -> Decimal {
    match env::var(key) {
        Ok(raw) => match raw.parse::<Decimal>() {
            Ok(value) if value > Decimal::ZERO => value,
            _ => {
                warn!("Invalid {}='{}', using default {}", key, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_defaults_are_sane() {
        let config = RiskConfig::default();
        assert_eq!(config.max_position_percent, dec!(0.25));
        assert_eq!(config.per_trade_risk_fraction, dec!(0.02));
        assert_eq!(config.max_positions, 50);
        assert!(!config.allow_fractional_shares);
    }

    #[test]
    fn regime_threshold_overrides_default() {
        let config = RiskConfig::default();
        assert_eq!(
            config.confidence_threshold(Some(MarketRegime::BearTrending)),
            70.0
        );
        assert_eq!(config.confidence_threshold(None), 60.0);
    }

    #[test]
    fn brokerage_defaults_to_disabled() {
        let settings = BrokerageSettings::default();
        assert!(!settings.enabled);
        assert_eq!(settings.port, 7497);
    }
}

//! Exit rule evaluation for open positions.
//!
//! Pure decisions only; fetching prices and submitting the resulting exits
//! belongs to the application loop.

use crate::domain::entities::{DayTradePosition, ExitReason, PositionStatus};
use crate::domain::services::market_hours;
use crate::domain::value_objects::Price;
use chrono::{DateTime, Utc};
use tracing::debug;

pub struct PositionMonitor {
    /// Open positions are flattened this many minutes before the close.
    flatten_before_close_minutes: u32,
}

impl Default for PositionMonitor {
    fn default() -> Self {
        Self {
            flatten_before_close_minutes: 15,
        }
    }
}

impl PositionMonitor {
    pub fn new(flatten_before_close_minutes: u32) -> Self {
        Self {
            flatten_before_close_minutes,
        }
    }

    /// Decides whether an OPEN position should be exited right now.
    ///
    /// Stop beats target when a price satisfies both, and the end-of-session
    /// flatten overrides nothing (a hit target still reports as a target).
    /// Outside market hours there is nothing to do.
    pub fn evaluate(
        &self,
        position: &DayTradePosition,
        current_price: Price,
        now: DateTime<Utc>,
    ) -> Option<ExitReason> {
        if position.status != PositionStatus::Open {
            return None;
        }
        if !market_hours::is_market_open(now) {
            return None;
        }
        let price = current_price.value();
        if price <= position.stop_price {
            debug!(position = %position.id, %price, stop = %position.stop_price, "Stop hit");
            return Some(ExitReason::StopHit);
        }
        if price >= position.target_price {
            debug!(position = %position.id, %price, target = %position.target_price, "Target hit");
            return Some(ExitReason::TargetHit);
        }
        if market_hours::is_near_close(now, self.flatten_before_close_minutes) {
            debug!(position = %position.id, "Flattening into the close");
            return Some(ExitReason::SessionClose);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use chrono_tz::America::New_York;
    use rust_decimal_macros::dec;

    fn open_position() -> DayTradePosition {
        DayTradePosition {
            id: "pos-1".to_string(),
            account_id: "acct-1".to_string(),
            symbol: "AAPL".to_string(),
            trade_date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            status: PositionStatus::Open,
            shares: dec!(10),
            entry_price: dec!(100),
            target_price: dec!(102),
            stop_price: dec!(99),
            exit_price: None,
            exit_reason: None,
            confidence_score: 75.0,
            predicted_return: 0.01,
            opened_at: None,
            closed_at: None,
        }
    }

    fn midday() -> DateTime<Utc> {
        New_York
            .with_ymd_and_hms(2025, 6, 2, 13, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn near_close() -> DateTime<Utc> {
        New_York
            .with_ymd_and_hms(2025, 6, 2, 15, 50, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn target_hit() {
        let monitor = PositionMonitor::default();
        let decision = monitor.evaluate(&open_position(), Price::new(dec!(102)).unwrap(), midday());
        assert_eq!(decision, Some(ExitReason::TargetHit));
    }

    #[test]
    fn stop_hit() {
        let monitor = PositionMonitor::default();
        let decision = monitor.evaluate(&open_position(), Price::new(dec!(98.99)).unwrap(), midday());
        assert_eq!(decision, Some(ExitReason::StopHit));
    }

    #[test]
    fn holds_between_stop_and_target() {
        let monitor = PositionMonitor::default();
        let decision = monitor.evaluate(&open_position(), Price::new(dec!(100.50)).unwrap(), midday());
        assert_eq!(decision, None);
    }

    #[test]
    fn flattens_into_the_close() {
        let monitor = PositionMonitor::default();
        let decision =
            monitor.evaluate(&open_position(), Price::new(dec!(100.50)).unwrap(), near_close());
        assert_eq!(decision, Some(ExitReason::SessionClose));
    }

    #[test]
    fn silent_outside_market_hours() {
        let monitor = PositionMonitor::default();
        let after_hours = New_York
            .with_ymd_and_hms(2025, 6, 2, 18, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        let decision =
            monitor.evaluate(&open_position(), Price::new(dec!(98)).unwrap(), after_hours);
        assert_eq!(decision, None);
    }

    #[test]
    fn ignores_positions_that_are_not_open() {
        let monitor = PositionMonitor::default();
        let mut position = open_position();
        position.status = PositionStatus::Closing;
        let decision = monitor.evaluate(&position, Price::new(dec!(98)).unwrap(), midday());
        assert_eq!(decision, None);
    }
}

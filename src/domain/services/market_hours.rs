//! NYSE session clock.
//!
//! The monitor only acts during regular hours, and the end-of-session
//! flatten kicks in over the last minutes before the close. Holidays are
//! not modeled; a closed holiday simply produces no fills to manage.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::America::New_York;

/// 9:30 New York, in minutes since midnight.
const OPEN_MINUTES: u32 = 9 * 60 + 30;
/// 16:00 New York, in minutes since midnight.
const CLOSE_MINUTES: u32 = 16 * 60;

fn session_minute(now: DateTime<Utc>) -> Option<u32> {
    let local = now.with_timezone(&New_York);
    if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
        return None;
    }
    Some(local.hour() * 60 + local.minute())
}

/// True during regular trading hours (9:30-16:00 New York, weekdays).
pub fn is_market_open(now: DateTime<Utc>) -> bool {
    match session_minute(now) {
        Some(minute) => (OPEN_MINUTES..CLOSE_MINUTES).contains(&minute),
        None => false,
    }
}

/// True within `minutes` of the close, while the market is still open.
/// This is the window where open positions are flattened.
pub fn is_near_close(now: DateTime<Utc>, minutes: u32) -> bool {
    match session_minute(now) {
        Some(minute) if (OPEN_MINUTES..CLOSE_MINUTES).contains(&minute) => {
            CLOSE_MINUTES - minute <= minutes
        }
        _ => false,
    }
}

/// Minutes until today's close, when the market is open.
pub fn minutes_to_close(now: DateTime<Utc>) -> Option<u32> {
    match session_minute(now) {
        Some(minute) if (OPEN_MINUTES..CLOSE_MINUTES).contains(&minute) => {
            Some(CLOSE_MINUTES - minute)
        }
        _ => None,
    }
}

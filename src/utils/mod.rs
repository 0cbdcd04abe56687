//! Common utilities and helper functions

pub mod retry;

use chrono::Utc;
use std::time::Duration;

/// Current unix time in seconds
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Seconds until `timestamp`, zero if it is already past
pub fn duration_until(timestamp: i64, now: i64) -> Duration {
    Duration::from_secs(u64::try_from(timestamp - now).unwrap_or(0))
}

/// Human readable form of a duration, e.g. `1h 5m 3s`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    match (hours, minutes) {
        (0, 0) => format!("{seconds}s"),
        (0, _) => format!("{minutes}m {seconds}s"),
        _ => format!("{hours}h {minutes}m {seconds}s"),
    }
}

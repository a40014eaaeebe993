//! Timestamp utilities

use chrono::{DateTime, Utc};
use std::time::SystemTime;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Seconds elapsed between `since` and `now`, clamped at zero
pub fn elapsed_seconds(since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = now.signed_duration_since(since).num_milliseconds().max(0);
    millis as f64 / 1000.0
}

/// Convert a filesystem timestamp (e.g. mtime) to UTC
pub fn from_system_time(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_now_returns_recent_timestamp() {
        let timestamp = now();
        // After 2000-01-01, before 2100-01-01
        assert!(timestamp.timestamp() > 946_684_800);
        assert!(timestamp.timestamp() < 4_102_444_800);
    }

    #[test]
    fn test_elapsed_seconds() {
        let start = now();
        let later = start + Duration::milliseconds(2_500);
        assert_eq!(elapsed_seconds(start, later), 2.5);
    }

    #[test]
    fn test_elapsed_seconds_never_negative() {
        let start = now();
        let earlier = start - Duration::seconds(10);
        assert_eq!(elapsed_seconds(start, earlier), 0.0);
    }

    #[test]
    fn test_from_system_time_round_trips_epoch_seconds() {
        let system = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);
        assert_eq!(from_system_time(system).timestamp(), 1_700_000_000);
    }
}

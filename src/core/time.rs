//! Wall-clock helpers
//!
//! Leases are stored as absolute expiry times in epoch milliseconds so they
//! survive being copied between partitions unchanged.

use std::time::Duration;

/// Epoch milliseconds type used for lease expiry bookkeeping
pub type EpochMillis = i64;

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> EpochMillis {
    chrono::Utc::now().timestamp_millis()
}

/// Convert a duration to whole milliseconds, saturating at `i64::MAX`
pub fn duration_millis(duration: Duration) -> EpochMillis {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Render an epoch-millisecond value as RFC 3339 for logs and tables
pub fn format_millis(millis: EpochMillis) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_millis_is_monotonic_enough() {
        let first = now_millis();
        std::thread::sleep(Duration::from_millis(2));
        assert!(now_millis() >= first);
    }

    #[test]
    fn test_duration_millis_saturates() {
        assert_eq!(duration_millis(Duration::from_secs(2)), 2000);
        assert_eq!(duration_millis(Duration::MAX), i64::MAX);
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(0), "1970-01-01T00:00:00+00:00");
    }
}

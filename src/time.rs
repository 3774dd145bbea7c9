//! Wall-clock timestamps
//!
//! All lifecycle logic takes the current time as an explicit argument so that
//! ticks, chunk-load callbacks and tests agree on a single clock reading.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch
pub type Timestamp = u64;

/// Current wall-clock time in milliseconds
pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or(0)
}

/// Milliseconds elapsed from `earlier` to `now`, zero if the clock went backwards
pub fn elapsed_since(earlier: Timestamp, now: Timestamp) -> u64 {
    now.saturating_sub(earlier)
}

/// Human-readable rendering for logs and the inspector
pub fn format_timestamp(ts: Timestamp) -> String {
    match chrono::DateTime::from_timestamp_millis(ts as i64) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => format!("{}ms", ts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_saturates() {
        assert_eq!(elapsed_since(100, 50), 0);
        assert_eq!(elapsed_since(50, 100), 50);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
    }
}

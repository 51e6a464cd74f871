//! Timestamp utilities

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Time elapsed since `since`, saturating at zero for timestamps in the future
pub fn elapsed_since(since: DateTime<Utc>) -> Duration {
    (now() - since).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_returns_recent_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01 00:00:00 UTC
        assert!(timestamp.timestamp() < 4_102_444_800); // 2100-01-01 00:00:00 UTC
    }

    #[test]
    fn test_elapsed_since_past() {
        let past = now() - chrono::Duration::seconds(10);
        let elapsed = elapsed_since(past);
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed < Duration::from_secs(60));
    }

    #[test]
    fn test_elapsed_since_future_is_zero() {
        let future = now() + chrono::Duration::seconds(60);
        assert_eq!(elapsed_since(future), Duration::ZERO);
    }
}

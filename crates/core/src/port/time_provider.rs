// Time Provider Port (for testability)

use chrono::{DateTime, Local, NaiveDate, Utc};

/// Time provider interface (allows mocking in tests)
pub trait TimeProvider: Send + Sync {
    /// Get current time in milliseconds since epoch
    fn now_millis(&self) -> i64;

    /// Current calendar date in the host's local time zone
    fn today(&self) -> NaiveDate {
        DateTime::<Utc>::from_timestamp_millis(self.now_millis())
            .map(|dt| dt.with_timezone(&Local).date_naive())
            .unwrap_or_default()
    }
}

/// System time provider (production)
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Time provider pinned to one calendar date (tests, replays)
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeProvider {
    today: NaiveDate,
}

impl FixedTimeProvider {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }
}

impl TimeProvider for FixedTimeProvider {
    fn now_millis(&self) -> i64 {
        self.today
            .and_hms_opt(12, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or_default()
    }

    fn today(&self) -> NaiveDate {
        self.today
    }
}

// Time Provider Port (for testability)

use chrono::{DateTime, TimeZone, Utc};

/// Time provider interface (allows mocking in tests)
pub trait TimeProvider: Send + Sync {
    /// Get current time in milliseconds since epoch
    fn now_millis(&self) -> i64;

    /// Current time as a UTC timestamp
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.now_millis())
            .single()
            .unwrap_or_else(Utc::now)
    }
}

/// System time provider (production)
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Manually advanced clock
    pub struct FixedTimeProvider {
        millis: AtomicI64,
    }

    impl FixedTimeProvider {
        pub fn new(millis: i64) -> Self {
            Self {
                millis: AtomicI64::new(millis),
            }
        }

        pub fn advance_millis(&self, delta: i64) {
            self.millis.fetch_add(delta, Ordering::SeqCst);
        }
    }

    impl TimeProvider for FixedTimeProvider {
        fn now_millis(&self) -> i64 {
            self.millis.load(Ordering::SeqCst)
        }
    }
}

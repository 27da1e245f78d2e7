//! Time sources.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Wall-clock and monotonic time, injectable for tests.
pub trait Clock: Send + Sync {
    /// Wall-clock time as Unix seconds
    fn now_unix(&self) -> f64;

    /// Monotonic instant for elapsed-time accounting
    fn now(&self) -> Instant;
}

/// [`Clock`] backed by the OS clocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}

//! Minimum-interval rate limiter.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Spaces consecutive calls at least `min_interval` apart.
///
/// The lock is held across the wait and the call, so concurrent callers queue up.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    /// Creates a throttle.
    #[must_use]
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    /// Returns the configured interval.
    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Runs `call` once the interval since the previous call ended has elapsed.
    ///
    /// The interval is measured from the end of the previous call, so request
    /// starts are always at least `min_interval` apart.
    pub fn run<R>(&self, call: impl FnOnce() -> R) -> R {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                std::thread::sleep(self.min_interval - elapsed);
            }
        }
        let result = call();
        *last = Some(Instant::now());
        result
    }
}

//! Injectable time source.
//!
//! All time-sensitive components (circuit breaker, traffic monitor, memory
//! KV backend, rate limiter) take an `Arc<dyn Clock>` instead of calling
//! `Instant::now()` directly, so tests can advance time deterministically.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use time::OffsetDateTime;

/// Monotonic plus wall-clock time source.
pub trait Clock: Send + Sync {
    /// Monotonic instant, used for expiries and cooldowns.
    fn now(&self) -> Instant;

    /// Wall-clock time, used for values surfaced to clients (rate-limit
    /// reset timestamps).
    fn now_utc(&self) -> OffsetDateTime;
}

/// Production clock backed by the system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_utc(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Manually advanced clock for tests.
///
/// Starts at construction time and only moves when `advance` is called.
/// The wall-clock start is snapped back to a whole minute so tests that
/// depend on window-bucketed keys see the same bucket boundaries on
/// every run.
pub struct ManualClock {
    start: Instant,
    start_utc: OffsetDateTime,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let start_utc = OffsetDateTime::from_unix_timestamp(now - now.rem_euclid(60))
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        Self {
            start: Instant::now(),
            start_utc,
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += delta;
    }

    fn offset(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.offset()
    }

    fn now_utc(&self) -> OffsetDateTime {
        self.start_utc + self.offset()
    }
}

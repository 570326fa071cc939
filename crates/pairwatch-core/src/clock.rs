//! Millisecond time sources.
//!
//! The cache never reads a clock itself; callers pass `now` in. A
//! [`TimeSource`] is what [`PairingMonitor`](crate::monitor::PairingMonitor)
//! consults once per advertisement and once per report.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;

/// Anything that can tell the current time in milliseconds.
///
/// Values must be non-decreasing from the caller's point of view; this is
/// trusted, not checked.
pub trait TimeSource {
    /// Current time in milliseconds.
    fn now_ms(&self) -> u64;
}

impl<F> TimeSource for F
where
    F: Fn() -> u64,
{
    fn now_ms(&self) -> u64 {
        self()
    }
}

/// Wall-clock milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now_ms(&self) -> u64 {
        // Pre-epoch clocks report zero rather than wrapping.
        u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying time, so a test can keep one handle
/// while a monitor owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock reading `start_ms`.
    #[must_use]
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Jump to `now_ms`.
    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    /// Move forward by `delta_ms` and return the new time.
    pub fn advance(&self, delta_ms: u64) -> u64 {
        self.now.fetch_add(delta_ms, Ordering::SeqCst) + delta_ms
    }
}

impl TimeSource for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

//! Monitor state shared between the advertisement and reporting tasks.
//!
//! The core cache is single threaded. Every access from a task goes through
//! one coarse lock around the whole [`PairingMonitor`], so an insert's
//! evict-then-allocate sequence is never interleaved with a report.

use std::sync::Arc;

use pairwatch_core::{
    CacheResult, CacheStats, DeviceCache, DeviceReport, Observation, PairingMonitor,
    RecordOutcome, ReportOrder, SystemClock, TimeSource,
};
use tokio::sync::{Mutex, MutexGuard};

/// Shared, lock-protected pairing monitor.
#[derive(Debug)]
pub struct SharedMonitor<C = SystemClock> {
    inner: Arc<Mutex<PairingMonitor<C>>>,
}

impl<C> Clone for SharedMonitor<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl SharedMonitor<SystemClock> {
    /// Monitor with a default-capacity cache and the wall clock.
    #[must_use]
    pub fn system() -> Self {
        Self::new(PairingMonitor::new(SystemClock))
    }
}

impl<C: TimeSource> SharedMonitor<C> {
    /// Wrap an existing monitor.
    pub fn new(monitor: PairingMonitor<C>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(monitor)),
        }
    }

    /// Monitor around a fresh cache of `capacity` devices.
    pub fn with_capacity(capacity: usize, clock: C) -> Self {
        Self::new(PairingMonitor::with_cache(
            DeviceCache::with_capacity(capacity),
            clock,
        ))
    }

    /// Record one advertisement under the lock.
    ///
    /// # Errors
    ///
    /// Only on internal cache bookkeeping failure.
    pub async fn record(&self, observation: &Observation) -> CacheResult<RecordOutcome> {
        self.inner.lock().await.on_advertisement(observation)
    }

    /// Build a report under the lock.
    pub async fn report(&self, order: ReportOrder) -> Vec<DeviceReport> {
        self.inner.lock().await.report(order)
    }

    /// Cache counters.
    pub async fn stats(&self) -> CacheStats {
        self.inner.lock().await.cache().stats()
    }

    /// Forget every tracked device.
    ///
    /// # Errors
    ///
    /// Only on internal cache bookkeeping failure.
    pub async fn clear(&self) -> CacheResult<()> {
        self.inner.lock().await.clear()
    }

    /// Hold the lock for a multi-step operation.
    pub async fn lock(&self) -> MutexGuard<'_, PairingMonitor<C>> {
        self.inner.lock().await
    }
}

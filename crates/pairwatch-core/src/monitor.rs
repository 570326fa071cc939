//! Pairing advertisement monitor.
//!
//! Glues a [`DeviceCache`] to a [`TimeSource`]: every advertisement is
//! stamped with the current time on arrival, and reports measure "time since
//! last observation" against a single reading taken when the report is built.

use tracing::{debug, instrument};

use crate::cache::{CacheResult, DeviceCache, RecordOutcome};
use crate::clock::TimeSource;
use crate::types::{DeviceReport, Observation, ReportOrder};

/// Tracks the most recently seen devices in pairing mode.
#[derive(Debug)]
pub struct PairingMonitor<C> {
    cache: DeviceCache,
    clock: C,
}

impl<C: TimeSource> PairingMonitor<C> {
    /// Create a monitor with a default-capacity cache.
    pub fn new(clock: C) -> Self {
        Self::with_cache(DeviceCache::new(), clock)
    }

    /// Create a monitor around an existing cache.
    pub const fn with_cache(cache: DeviceCache, clock: C) -> Self {
        Self { cache, clock }
    }

    /// Handle one pairing advertisement event.
    ///
    /// # Errors
    ///
    /// Only on internal cache bookkeeping failure.
    #[instrument(level = "trace", skip_all, fields(device_id = observation.device_id))]
    pub fn on_advertisement(&mut self, observation: &Observation) -> CacheResult<RecordOutcome> {
        let now_ms = self.clock.now_ms();
        self.cache.record_observation(observation, now_ms)
    }

    /// Rows for every cached device in the requested order.
    #[must_use]
    pub fn report(&self, order: ReportOrder) -> Vec<DeviceReport> {
        let now_ms = self.clock.now_ms();
        let entries = match order {
            ReportOrder::SignalStrength => self.cache.snapshot_by_signal_strength(),
            ReportOrder::Recency => self.cache.snapshot_by_time(),
        };
        debug!(devices = entries.len(), %order, "Built device report");
        entries
            .iter()
            .map(|entry| DeviceReport::from_entry(entry, now_ms))
            .collect()
    }

    /// Forget every tracked device.
    ///
    /// # Errors
    ///
    /// Only on internal cache bookkeeping failure.
    pub fn clear(&mut self) -> CacheResult<()> {
        self.cache.clear()
    }

    /// The underlying cache.
    #[must_use]
    pub const fn cache(&self) -> &DeviceCache {
        &self.cache
    }

    /// Number of tracked devices.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether no device is tracked.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// The time source in use.
    #[must_use]
    pub const fn clock(&self) -> &C {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_advertisements_are_stamped_with_clock() {
        let clock = ManualClock::new(1_000);
        let mut monitor = PairingMonitor::new(clock.clone());

        monitor.on_advertisement(&Observation::new(1, 40)).unwrap();
        clock.advance(250);
        monitor.on_advertisement(&Observation::new(2, 60)).unwrap();

        assert_eq!(monitor.cache().get(1).unwrap().last_seen_ms, 1_000);
        assert_eq!(monitor.cache().get(2).unwrap().last_seen_ms, 1_250);
    }

    #[test]
    fn test_report_ages_use_report_time() {
        let clock = ManualClock::new(0);
        let mut monitor = PairingMonitor::new(clock.clone());
        monitor
            .on_advertisement(&Observation::new(1, 40).with_name("alpha"))
            .unwrap();
        clock.set(100);
        monitor
            .on_advertisement(&Observation::new(2, 60).with_name("beta"))
            .unwrap();
        clock.set(400);

        let rows = monitor.report(ReportOrder::SignalStrength);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].device_name, "beta");
        assert_eq!(rows[0].age_ms, 300);
        assert_eq!(rows[1].device_name, "alpha");
        assert_eq!(rows[1].age_ms, 400);

        let rows = monitor.report(ReportOrder::Recency);
        assert_eq!(rows[0].device_id, 2);
        assert_eq!(rows[1].device_id, 1);
    }

    #[test]
    fn test_clear_empties_monitor() {
        let mut monitor = PairingMonitor::new(|| 5_u64);
        monitor.on_advertisement(&Observation::new(1, 1)).unwrap();
        assert_eq!(monitor.len(), 1);
        monitor.clear().unwrap();
        assert!(monitor.is_empty());
        assert!(monitor.report(ReportOrder::Recency).is_empty());
    }

    #[test]
    fn test_with_cache_respects_capacity() {
        let mut monitor = PairingMonitor::with_cache(DeviceCache::with_capacity(2), || 0_u64);
        for id in 0..5 {
            monitor.on_advertisement(&Observation::new(id, 0)).unwrap();
        }
        assert_eq!(monitor.len(), 2);
        assert_eq!(monitor.clock().now_ms(), 0);
    }
}

//! Simulated pairing advertisement feed.
//!
//! Stands in for the radio stack. Devices `1..=recurring` advertise
//! constantly; devices above that form a larger population that each show
//! up once per pass. Signal strength is scrambled by a fixed step on every
//! event so that reports have something to sort.

use pairwatch_core::{
    CacheResult, DeviceCache, DeviceReport, FeedConfig, ManualClock, Observation, PairingMonitor,
    ReportOrder, DEFAULT_CAPACITY,
};
use tracing::info;

/// Amount added (wrapping) to the rssi after every advertisement.
pub const RSSI_STEP: u8 = 21;

/// Simulated time between two scenario advertisements, in milliseconds.
pub const SCENARIO_TICK_MS: u64 = 5;

/// Build the observation a simulated device would broadcast.
#[must_use]
pub fn simulated_observation(device_id: u32, rssi: u8) -> Observation {
    Observation::new(device_id, rssi)
        .with_name(&format!("pair_{device_id:02}"))
        .with_data(format!("data_{device_id:02}").as_bytes())
        .with_rf_address(device_id)
}

/// Endless, deterministic stream of advertisements.
///
/// Emits one device from the unique population, then every recurring
/// device, then the next unique device, and so on.
#[derive(Debug, Clone)]
pub struct AdvertisementFeed {
    unique_devices: u32,
    recurring_devices: u32,
    next_unique: u32,
    next_recurring: u32,
    rssi: u8,
}

impl AdvertisementFeed {
    /// Create a feed; `unique_devices` is clamped to at least one.
    #[must_use]
    pub fn new(unique_devices: u32, recurring_devices: u32) -> Self {
        Self {
            unique_devices: unique_devices.max(1),
            recurring_devices,
            next_unique: 0,
            next_recurring: recurring_devices,
            rssi: 1,
        }
    }

    /// Create a feed from configuration.
    #[must_use]
    pub fn from_config(config: &FeedConfig) -> Self {
        Self::new(config.unique_devices, config.recurring_devices)
    }

    fn next_device_id(&mut self) -> u32 {
        if self.next_recurring < self.recurring_devices {
            self.next_recurring += 1;
            return self.next_recurring;
        }
        let id = self.recurring_devices + 1 + self.next_unique;
        self.next_unique = (self.next_unique + 1) % self.unique_devices;
        self.next_recurring = 0;
        id
    }
}

impl Iterator for AdvertisementFeed {
    type Item = Observation;

    fn next(&mut self) -> Option<Self::Item> {
        let device_id = self.next_device_id();
        let observation = simulated_observation(device_id, self.rssi);
        self.rssi = self.rssi.wrapping_add(RSSI_STEP);
        Some(observation)
    }
}

/// Fixed advertisement sequences exercising fill, merge, and eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Twice the cache capacity of distinct devices; the first half is evicted.
    Fill,
    /// The same five devices advertising for three rounds.
    Duplicates,
    /// A full cache of distinct devices, then five chatty devices for seven rounds.
    DuplicatesAndUniques,
}

/// Final cache contents after a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    /// Which scenario ran.
    pub scenario: Scenario,
    /// Number of advertisements fed in.
    pub advertisements: usize,
    /// Rows, most recently seen first.
    pub by_recency: Vec<DeviceReport>,
    /// Rows, strongest signal first.
    pub by_signal_strength: Vec<DeviceReport>,
}

impl Scenario {
    /// Every scenario in run order.
    pub const ALL: [Self; 3] = [Self::Fill, Self::Duplicates, Self::DuplicatesAndUniques];

    /// Short name used in logs and report headers.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fill => "fill",
            Self::Duplicates => "duplicates",
            Self::DuplicatesAndUniques => "duplicates_and_uniques",
        }
    }

    /// Device ids in the order they advertise.
    #[must_use]
    pub fn device_ids(self) -> Vec<u32> {
        let capacity = u32::try_from(DEFAULT_CAPACITY).unwrap_or(u32::MAX);
        match self {
            Self::Fill => (1..=capacity * 2).collect(),
            Self::Duplicates => (0..3).flat_map(|_| 1..=5).collect(),
            Self::DuplicatesAndUniques => (6..6 + capacity)
                .chain((0..7).flat_map(|_| 1..=5))
                .collect(),
        }
    }

    /// Feed the scenario into a fresh default-capacity monitor.
    ///
    /// # Errors
    ///
    /// Only on internal cache bookkeeping failure.
    pub fn run(self) -> CacheResult<ScenarioOutcome> {
        let clock = ManualClock::new(0);
        let mut monitor = PairingMonitor::with_cache(DeviceCache::new(), clock.clone());

        let ids = self.device_ids();
        let mut rssi: u8 = 1;
        for &device_id in &ids {
            clock.advance(SCENARIO_TICK_MS);
            monitor.on_advertisement(&simulated_observation(device_id, rssi))?;
            rssi = rssi.wrapping_add(RSSI_STEP);
        }

        let stats = monitor.cache().stats();
        info!(
            scenario = self.name(),
            advertisements = ids.len(),
            devices = stats.len,
            evictions = stats.evictions,
            "Scenario complete"
        );

        let outcome = ScenarioOutcome {
            scenario: self,
            advertisements: ids.len(),
            by_recency: monitor.report(ReportOrder::Recency),
            by_signal_strength: monitor.report(ReportOrder::SignalStrength),
        };
        monitor.clear()?;
        Ok(outcome)
    }
}

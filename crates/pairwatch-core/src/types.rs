//! Shared types.
//!
//! [`Observation`] is the payload of one pairing advertisement as handed over
//! by the radio stack. [`Entry`] is what the cache keeps per device, and
//! [`DeviceReport`] is the serializable row handed to reporting consumers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Size of the fixed device name buffer in bytes.
pub const DEVICE_NAME_LEN: usize = 16;

/// Size of the fixed device data buffer in bytes.
pub const DEVICE_DATA_LEN: usize = 64;

/// One sighting of a device advertising in pairing mode.
///
/// Every field except `rssi` is stable for a given `device_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Identity of the advertising device.
    pub device_id: u32,

    /// Device name, NUL padded.
    pub device_name: [u8; DEVICE_NAME_LEN],

    /// Opaque advertisement payload.
    pub device_data: [u8; DEVICE_DATA_LEN],

    /// Radio address of the device.
    pub rf_address: u32,

    /// Received signal strength of this sighting.
    pub rssi: u8,
}

impl Observation {
    /// Create an observation with empty name and data buffers.
    #[must_use]
    pub const fn new(device_id: u32, rssi: u8) -> Self {
        Self {
            device_id,
            device_name: [0; DEVICE_NAME_LEN],
            device_data: [0; DEVICE_DATA_LEN],
            rf_address: 0,
            rssi,
        }
    }

    /// Set the device name, truncated to [`DEVICE_NAME_LEN`] bytes.
    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.device_name = [0; DEVICE_NAME_LEN];
        copy_truncated(&mut self.device_name, name.as_bytes());
        self
    }

    /// Set the advertisement payload, truncated to [`DEVICE_DATA_LEN`] bytes.
    #[must_use]
    pub fn with_data(mut self, data: &[u8]) -> Self {
        self.device_data = [0; DEVICE_DATA_LEN];
        copy_truncated(&mut self.device_data, data);
        self
    }

    /// Set the radio address.
    #[must_use]
    pub const fn with_rf_address(mut self, rf_address: u32) -> Self {
        self.rf_address = rf_address;
        self
    }

    /// Device name up to the first NUL, with invalid UTF-8 replaced.
    #[must_use]
    pub fn name_lossy(&self) -> String {
        let end = self
            .device_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(DEVICE_NAME_LEN);
        String::from_utf8_lossy(&self.device_name[..end]).into_owned()
    }
}

fn copy_truncated(dst: &mut [u8], src: &[u8]) {
    let len = src.len().min(dst.len());
    dst[..len].copy_from_slice(&src[..len]);
}

/// The cache's record of one distinct device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    /// Latest advertisement data for the device.
    pub observation: Observation,

    /// Time of the latest observation, in milliseconds.
    pub last_seen_ms: u64,
}

impl Entry {
    /// Identity of the device.
    #[inline]
    #[must_use]
    pub const fn device_id(&self) -> u32 {
        self.observation.device_id
    }

    /// Signal strength of the latest observation.
    #[inline]
    #[must_use]
    pub const fn rssi(&self) -> u8 {
        self.observation.rssi
    }

    /// Milliseconds elapsed between the latest observation and `now_ms`.
    ///
    /// Saturates at zero if the clock appears to have gone backwards.
    #[inline]
    #[must_use]
    pub const fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_seen_ms)
    }
}

/// A reportable row describing one cached device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceReport {
    /// Identity of the device.
    pub device_id: u32,

    /// Device name as text.
    pub device_name: String,

    /// Signal strength of the latest observation.
    pub rssi: u8,

    /// Radio address of the device.
    pub rf_address: u32,

    /// Time of the latest observation, in milliseconds.
    pub last_seen_ms: u64,

    /// Time since the latest observation, in milliseconds.
    pub age_ms: u64,
}

impl DeviceReport {
    /// Build a row from a cache entry, measuring its age against `now_ms`.
    #[must_use]
    pub fn from_entry(entry: &Entry, now_ms: u64) -> Self {
        Self {
            device_id: entry.device_id(),
            device_name: entry.observation.name_lossy(),
            rssi: entry.rssi(),
            rf_address: entry.observation.rf_address,
            last_seen_ms: entry.last_seen_ms,
            age_ms: entry.age_ms(now_ms),
        }
    }
}

/// Ordering of a device report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportOrder {
    /// Strongest signal first; ties most recently seen first.
    #[default]
    SignalStrength,

    /// Most recently seen first.
    Recency,
}

impl fmt::Display for ReportOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SignalStrength => write!(f, "signal_strength"),
            Self::Recency => write!(f, "recency"),
        }
    }
}

impl FromStr for ReportOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "signal_strength" | "signal" | "rssi" => Ok(Self::SignalStrength),
            "recency" | "time" => Ok(Self::Recency),
            other => Err(format!(
                "unknown report order '{other}', expected 'signal_strength' or 'recency'"
            )),
        }
    }
}

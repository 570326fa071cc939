//! # pairwatch-core
//!
//! Core logic for tracking devices that broadcast pairing advertisements.
//!
//! This crate provides:
//! - A fixed-capacity block allocator with O(1) allocate and release
//! - A bounded, identity-deduplicated, recency-ordered device cache
//! - Snapshots ordered by recency or by signal strength
//! - Configuration loading, saving, and validation
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`pool`] - Fixed-capacity arena of uniformly sized blocks
//! - [`cache`] - Recency cache of the most recently seen devices
//! - [`monitor`] - Advertisement handler binding a cache to a clock
//! - [`clock`] - Millisecond time sources
//! - [`config`] - Application configuration
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Observations, entries, and report rows
//!
//! ## Concurrency
//!
//! Everything here is single threaded and never blocks. Callers that feed
//! the cache from several execution contexts must serialize access with one
//! coarse lock around the whole [`PairingMonitor`] or [`DeviceCache`].

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod monitor;
pub mod pool;
pub mod types;

// Re-export primary types for convenience
pub use cache::{CacheError, CacheResult, CacheStats, DeviceCache, RecordOutcome, DEFAULT_CAPACITY};
pub use clock::{ManualClock, SystemClock, TimeSource};
pub use config::{
    config_path_from_env, default_config_path, Config, ConfigError, ConfigResult, FeedConfig,
    LoggingConfig, ReportConfig, ReportFormat, RunMode,
};
pub use error::{Error, PairwatchError, Result};
pub use monitor::PairingMonitor;
pub use pool::{BlockId, BlockPool, PoolError, PoolResult, PoolStats};
pub use types::{DeviceReport, Entry, Observation, ReportOrder, DEVICE_DATA_LEN, DEVICE_NAME_LEN};

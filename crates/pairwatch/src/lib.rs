//! # pairwatch
//!
//! Runtime around the pairwatch-core device cache.
//!
//! This library provides the simulated advertisement feed, the shared
//! monitor state, report rendering, and the live and scenario run modes.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod feed;
pub mod logging;
pub mod report;
pub mod runner;
pub mod state;

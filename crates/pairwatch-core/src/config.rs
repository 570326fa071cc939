//! Application configuration management.
//!
//! Handles loading, saving, and validating pairwatch configuration:
//! - Logging level and production mode
//! - Report interval, ordering, and output format
//! - Simulated advertisement feed settings
//!
//! The cache capacity is not configurable; it is fixed at
//! [`DEFAULT_CAPACITY`](crate::cache::DEFAULT_CAPACITY).
//!
//! Values come from a TOML file (missing file means defaults) and can be
//! overridden by `PAIRWATCH_*` environment variables.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ReportOrder;

/// Environment variable names.
pub mod env_vars {
    /// Path of the configuration file.
    pub const CONFIG_PATH: &str = "PAIRWATCH_CONFIG";
    /// Log level or `EnvFilter` directive.
    pub const LOG_LEVEL: &str = "PAIRWATCH_LOG_LEVEL";
    /// `true` for production logging.
    pub const PRODUCTION: &str = "PAIRWATCH_PRODUCTION";
    /// Seconds between periodic reports.
    pub const REPORT_INTERVAL_SECS: &str = "PAIRWATCH_REPORT_INTERVAL_SECS";
    /// `signal_strength` or `recency`.
    pub const REPORT_ORDER: &str = "PAIRWATCH_REPORT_ORDER";
    /// `table` or `json`.
    pub const REPORT_FORMAT: &str = "PAIRWATCH_REPORT_FORMAT";
    /// `live` or `scenarios`.
    pub const MODE: &str = "PAIRWATCH_MODE";
    /// Milliseconds between simulated advertisements.
    pub const ADVERTISE_INTERVAL_MS: &str = "PAIRWATCH_ADVERTISE_INTERVAL_MS";
    /// Seconds to run the live feed, 0 for until interrupted.
    pub const DURATION_SECS: &str = "PAIRWATCH_DURATION_SECS";
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The configuration file could not be read.
    #[error("Failed to read {}: {source}", .path.display())]
    ReadError {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file could not be written.
    #[error("Failed to write {}: {source}", .path.display())]
    WriteError {
        /// File that was being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// The configuration could not be rendered as TOML.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A single field holds an invalid value.
    #[error("Invalid value for '{field}': {message}")]
    ValidationError {
        /// Dotted field path, e.g. `report.interval_secs`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields hold invalid values.
    #[error("{} configuration errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

impl ConfigError {
    fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging settings.
    pub logging: LoggingConfig,

    /// Periodic report settings.
    pub report: ReportConfig,

    /// Simulated advertisement feed settings.
    pub feed: FeedConfig,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive (e.g. `info,pairwatch_core=debug`).
    pub level: String,

    /// JSON logs to rolling files plus compact stdout when `true`.
    pub production: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            production: false,
        }
    }
}

/// Periodic report settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Seconds between reports.
    pub interval_secs: u64,

    /// Row ordering.
    pub order: ReportOrder,

    /// Output format.
    pub format: ReportFormat,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            order: ReportOrder::SignalStrength,
            format: ReportFormat::Table,
        }
    }
}

/// Output format of a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    /// Human readable table.
    #[default]
    Table,
    /// One JSON document per report.
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "table" | "text" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown report format '{other}', expected 'table' or 'json'")),
        }
    }
}

/// How the binary drives the monitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Continuous simulated feed with periodic reports.
    #[default]
    Live,
    /// Run the fixed fill / duplicate scenarios once and exit.
    Scenarios,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Scenarios => write!(f, "scenarios"),
        }
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "scenarios" | "scenario" => Ok(Self::Scenarios),
            other => Err(format!("unknown mode '{other}', expected 'live' or 'scenarios'")),
        }
    }
}

/// Simulated advertisement feed settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Live feed or one-shot scenarios.
    pub mode: RunMode,

    /// Milliseconds between advertisements.
    pub advertise_interval_ms: u64,

    /// Devices that show up once per pass of the population.
    pub unique_devices: u32,

    /// Devices that advertise again after every unique device.
    pub recurring_devices: u32,

    /// Seconds to run the live feed; 0 runs until interrupted.
    pub duration_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Live,
            advertise_interval_ms: 50,
            unique_devices: 40,
            recurring_devices: 5,
            duration_secs: 0,
        }
    }
}

impl Config {
    /// Load configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable, or malformed.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration from `path`, falling back to defaults if it is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        match Self::load(path) {
            Err(ConfigError::NotFound(path)) => {
                tracing::debug!(path = %path.display(), "No configuration file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Save configuration to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::WriteError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `PAIRWATCH_*` environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a variable that cannot be parsed.
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any name -> value lookup.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a value that cannot be parsed.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(env_vars::LOG_LEVEL) {
            self.logging.level = level;
        }
        if let Some(value) = lookup(env_vars::PRODUCTION) {
            self.logging.production = parse_override(env_vars::PRODUCTION, &value)?;
        }
        if let Some(value) = lookup(env_vars::REPORT_INTERVAL_SECS) {
            self.report.interval_secs = parse_override(env_vars::REPORT_INTERVAL_SECS, &value)?;
        }
        if let Some(value) = lookup(env_vars::REPORT_ORDER) {
            self.report.order = parse_override(env_vars::REPORT_ORDER, &value)?;
        }
        if let Some(value) = lookup(env_vars::REPORT_FORMAT) {
            self.report.format = parse_override(env_vars::REPORT_FORMAT, &value)?;
        }
        if let Some(value) = lookup(env_vars::MODE) {
            self.feed.mode = parse_override(env_vars::MODE, &value)?;
        }
        if let Some(value) = lookup(env_vars::ADVERTISE_INTERVAL_MS) {
            self.feed.advertise_interval_ms =
                parse_override(env_vars::ADVERTISE_INTERVAL_MS, &value)?;
        }
        if let Some(value) = lookup(env_vars::DURATION_SECS) {
            self.feed.duration_secs = parse_override(env_vars::DURATION_SECS, &value)?;
        }
        Ok(())
    }

    /// Check every field, reporting all violations at once.
    ///
    /// # Errors
    ///
    /// Returns the single violation, or
    /// [`ConfigError::MultipleValidationErrors`] when there are several.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if self.logging.level.trim().is_empty() {
            errors.push(ConfigError::invalid("logging.level", "must not be empty"));
        }
        if self.report.interval_secs == 0 {
            errors.push(ConfigError::invalid(
                "report.interval_secs",
                "must be at least 1",
            ));
        }
        if self.feed.advertise_interval_ms == 0 {
            errors.push(ConfigError::invalid(
                "feed.advertise_interval_ms",
                "must be at least 1",
            ));
        }
        if self.feed.unique_devices == 0 {
            errors.push(ConfigError::invalid(
                "feed.unique_devices",
                "must be at least 1",
            ));
        }
        if self.feed.recurring_devices > self.feed.unique_devices {
            errors.push(ConfigError::invalid(
                "feed.recurring_devices",
                format!(
                    "must not exceed feed.unique_devices ({})",
                    self.feed.unique_devices
                ),
            ));
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

fn parse_override<T>(name: &str, value: &str) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(name, e.to_string()))
}

/// Default configuration file location.
///
/// On Linux: `/etc/pairwatch/config.toml`.
/// Elsewhere: the platform config directory, e.g. `~/.config/pairwatch/`.
#[must_use]
pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/etc/pairwatch/config.toml")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "pairwatch").map_or_else(
            || PathBuf::from("pairwatch.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }
}

/// Configuration file location, honouring `PAIRWATCH_CONFIG`.
#[must_use]
pub fn config_path_from_env() -> PathBuf {
    std::env::var_os(env_vars::CONFIG_PATH).map_or_else(default_config_path, PathBuf::from)
}

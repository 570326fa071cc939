//! Unified error types for the pairwatch core library.
//!
//! This module provides a unified error type [`PairwatchError`] that covers all
//! failure modes across the crate. Each module also has its own specific error
//! type ([`PoolError`], [`CacheError`], [`ConfigError`]) for internal use.
//!
//! # Error Categories
//!
//! - **Allocator errors** are contract violations. Under correct cache
//!   bookkeeping they never happen, so they are fatal.
//! - **Cache errors** mean the recency list no longer matches the allocator.
//!   Also fatal.
//! - **Configuration and persistence errors** are ordinary operational
//!   failures.
//!
//! The cache's overflow guard has no variant here: it repairs itself and
//! only logs a warning.
//!
//! # Example
//!
//! ```rust
//! use pairwatch_core::error::{PairwatchError, Result};
//! use std::path::PathBuf;
//!
//! fn require_config(path: &PathBuf) -> Result<()> {
//!     if !path.exists() {
//!         return Err(PairwatchError::ConfigNotFound(path.clone()));
//!     }
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::pool::PoolError;

/// The unified error type for all pairwatch operations.
#[derive(Debug, Error)]
pub enum PairwatchError {
    // =========================================================================
    // ALLOCATOR ERRORS
    // =========================================================================
    /// The block pool had no free block when one was required.
    #[error("Device storage exhausted: all {capacity} blocks in use. This is a cache bookkeeping bug.")]
    PoolExhausted {
        /// Number of blocks in the pool.
        capacity: usize,
    },

    /// A block handle did not name a live block.
    #[error("Invalid device storage block {index}#{generation}")]
    InvalidBlock {
        /// Slot index carried by the handle.
        index: usize,
        /// Generation carried by the handle.
        generation: u32,
    },

    /// A block was released twice without being reallocated.
    #[error("Device storage block {index} released twice")]
    DoubleRelease {
        /// Slot index carried by the handle.
        index: usize,
    },

    /// The block pool was used after being destroyed.
    #[error("Device storage used after destroy")]
    PoolDestroyed,

    // =========================================================================
    // CACHE ERRORS
    // =========================================================================
    /// The recency list references storage that is not live.
    #[error("Device cache recency list is corrupted at block {index}")]
    CacheCorrupted {
        /// Slot index of the dangling link.
        index: usize,
    },

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // PERSISTENCE ERRORS
    // =========================================================================
    /// An error occurred while reading or writing a file.
    #[error("Persistence error: {0}")]
    PersistenceError(String),
}

/// A specialized [`Result`] type for pairwatch operations.
pub type Result<T> = std::result::Result<T, PairwatchError>;

/// Short alias for [`PairwatchError`].
pub type Error = PairwatchError;

impl PairwatchError {
    /// Returns `true` if this error came from the block allocator.
    #[inline]
    #[must_use]
    pub const fn is_pool_error(&self) -> bool {
        matches!(
            self,
            Self::PoolExhausted { .. }
                | Self::InvalidBlock { .. }
                | Self::DoubleRelease { .. }
                | Self::PoolDestroyed
        )
    }

    /// Returns `true` if this error came from the recency list.
    #[inline]
    #[must_use]
    pub const fn is_cache_error(&self) -> bool {
        matches!(self, Self::CacheCorrupted { .. })
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if this error signals broken internal bookkeeping.
    ///
    /// Such errors must halt the tracker rather than be retried.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        self.is_pool_error() || self.is_cache_error()
    }

    /// Returns a sysexits-style process exit code for this error.
    #[inline]
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            // EX_SOFTWARE - internal software error
            Self::PoolExhausted { .. }
            | Self::InvalidBlock { .. }
            | Self::DoubleRelease { .. }
            | Self::PoolDestroyed
            | Self::CacheCorrupted { .. } => 70,

            // EX_CONFIG - configuration error
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_) => {
                78
            }

            // EX_IOERR - input/output error
            Self::PersistenceError(_) => 74,
        }
    }

    /// Returns a machine-readable error code.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::PoolExhausted { .. } => "POOL_EXHAUSTED",
            Self::InvalidBlock { .. } => "INVALID_BLOCK",
            Self::DoubleRelease { .. } => "DOUBLE_RELEASE",
            Self::PoolDestroyed => "POOL_DESTROYED",
            Self::CacheCorrupted { .. } => "CACHE_CORRUPTED",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<PoolError> for PairwatchError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::PoolExhausted { capacity } => Self::PoolExhausted { capacity },
            PoolError::InvalidBlock { index, generation } => {
                Self::InvalidBlock { index, generation }
            }
            PoolError::DoubleRelease { index } => Self::DoubleRelease { index },
            PoolError::Destroyed => Self::PoolDestroyed,
        }
    }
}

impl From<CacheError> for PairwatchError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Allocator(pool) => Self::from(pool),
            CacheError::DanglingLink { index } => Self::CacheCorrupted { index },
        }
    }
}

impl From<ConfigError> for PairwatchError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::ReadError { path, source } => {
                Self::PersistenceError(format!("Failed to read {}: {}", path.display(), source))
            }
            ConfigError::WriteError { path, source } => {
                Self::PersistenceError(format!("Failed to write {}: {}", path.display(), source))
            }
            ConfigError::ParseError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_error_classification() {
        assert!(PairwatchError::PoolExhausted { capacity: 32 }.is_pool_error());
        assert!(PairwatchError::DoubleRelease { index: 1 }.is_pool_error());
        assert!(PairwatchError::PoolDestroyed.is_pool_error());
        assert!(!PairwatchError::ConfigParseError("x".into()).is_pool_error());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(PairwatchError::PoolExhausted { capacity: 32 }.is_fatal());
        assert!(PairwatchError::CacheCorrupted { index: 3 }.is_fatal());
        assert!(!PairwatchError::ConfigNotFound(PathBuf::new()).is_fatal());
        assert!(!PairwatchError::PersistenceError("disk full".into()).is_fatal());
    }

    #[test]
    fn test_config_error_classification() {
        assert!(PairwatchError::ConfigNotFound(PathBuf::from("/test")).is_config_error());
        assert!(PairwatchError::ConfigValidationError("bad".into()).is_config_error());
        assert!(!PairwatchError::PoolDestroyed.is_config_error());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(PairwatchError::DoubleRelease { index: 0 }.exit_code(), 70);
        assert_eq!(PairwatchError::ConfigParseError("x".into()).exit_code(), 78);
        assert_eq!(PairwatchError::PersistenceError("x".into()).exit_code(), 74);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            PairwatchError::PoolExhausted { capacity: 1 }.error_code(),
            "POOL_EXHAUSTED"
        );
        assert_eq!(
            PairwatchError::CacheCorrupted { index: 0 }.error_code(),
            "CACHE_CORRUPTED"
        );
    }

    #[test]
    fn test_from_pool_error() {
        let err: PairwatchError = PoolError::DoubleRelease { index: 4 }.into();
        assert!(matches!(err, PairwatchError::DoubleRelease { index: 4 }));
    }

    #[test]
    fn test_from_cache_error_unwraps_allocator() {
        let err: PairwatchError = CacheError::Allocator(PoolError::Destroyed).into();
        assert!(matches!(err, PairwatchError::PoolDestroyed));

        let err: PairwatchError = CacheError::DanglingLink { index: 9 }.into();
        assert!(matches!(err, PairwatchError::CacheCorrupted { index: 9 }));
    }

    #[test]
    fn test_from_config_validation_errors() {
        let err: PairwatchError = ConfigError::MultipleValidationErrors(vec![
            ConfigError::ValidationError {
                field: "a".into(),
                message: "bad".into(),
            },
            ConfigError::ValidationError {
                field: "b".into(),
                message: "worse".into(),
            },
        ])
        .into();
        let message = err.to_string();
        assert!(message.contains("'a': bad"));
        assert!(message.contains("'b': worse"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<PairwatchError>();
        assert_sync::<PairwatchError>();
    }
}

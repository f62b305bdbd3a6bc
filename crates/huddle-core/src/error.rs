//! Error types for `huddle-core`.
//!
//! All fallible operations in the core library return [`CoreResult<T>`],
//! which is an alias for `Result<T, CoreError>`.

use std::path::PathBuf;

/// Unified error type for all core operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The backing key-value store failed or is unreachable.
    #[error("store error: {0}")]
    Store(String),

    /// `incr` was called on a key whose value is not an integer.
    #[error("value at key {0} is not an integer")]
    NotAnInteger(String),

    /// The configuration file does not exist.
    #[error("path not found: {0}")]
    NotFound(PathBuf),

    /// The process lacks permission to read the configuration file.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Failed to parse a TOML configuration file.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// An I/O error that doesn't fit a more specific variant.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout `huddle-core`.
pub type CoreResult<T> = Result<T, CoreError>;

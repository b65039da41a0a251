//! Core error types for focuslock-core.
//!
//! Each component owns a small error enum; `CoreError` aggregates them for
//! callers (the CLI) that just want to report a failure. Inside the engine
//! most of these are recovered locally and only logged.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for focuslock-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Persisted state could not be read or written
    #[error("Persistence error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Timer command rejected or failed
    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),

    /// Blocking surface could not be rendered
    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),

    /// Foreground-app query failed
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persisted state store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the backing database
    #[error("Failed to open state store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Read or write against the backing store failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Stored value exists but cannot be decoded as the requested type
    #[error("Corrupt value for '{key}': {message}")]
    Corrupt { key: String, message: String },

    /// A lock guarding the store was poisoned by a panicking writer
    #[error("State store lock poisoned")]
    Poisoned,

    /// Backend refuses all access (no durable storage available)
    #[error("State store unavailable: {0}")]
    Unavailable(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Key does not exist in the configuration tree
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Data directory could not be determined or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Timer command errors.
#[derive(Error, Debug)]
pub enum TimerError {
    /// Timer state could not be persisted; the timer stays idle
    #[error("Timer state could not be persisted: {0}")]
    Persistence(#[from] StoreError),

    /// Command is not valid in the current timer phase
    #[error("Cannot {command} while timer is {phase}")]
    InvalidTransition {
        command: &'static str,
        phase: crate::timer::TimerPhase,
    },

    /// Zero-minute start or extension
    #[error("Duration must be at least one minute")]
    InvalidDuration,
}

/// Enforcement surface errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    /// The permission to draw over other apps is not granted
    #[error("Permission to render the blocking surface is missing")]
    PermissionMissing,

    /// The renderer failed for another reason
    #[error("Renderer failed: {0}")]
    Render(String),
}

/// Foreground-app oracle errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// The oracle could not answer (no usage access, backend error)
    #[error("Foreground-app oracle unavailable: {0}")]
    Unavailable(String),

    /// The query did not complete within the poll budget
    #[error("Foreground-app query timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg)
                if inner.code == rusqlite::ErrorCode::CannotOpen =>
            {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        StoreError::Poisoned
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

//! Core error types for aura-core.
//!
//! This module defines the error hierarchy using thiserror. Signal
//! absence is deliberately NOT an error anywhere in this crate -- a
//! missing sensor reading is modeled as `Option::None` and flows into
//! reduced confidence instead.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for aura-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Background-task registration errors
    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A background cycle exceeded its time budget and was abandoned.
    #[error("Cycle timed out after {budget_ms} ms")]
    CycleTimeout { budget_ms: u64 },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// The current-snapshot slot already holds a newer result.
    #[error("Stale write rejected: slot sequence {slot} >= candidate {candidate}")]
    StaleWrite { slot: u64, candidate: u64 },
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

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Background-task registration errors.
///
/// These are recorded in [`crate::health::BackgroundHealthStatus`] and
/// surfaced passively through diagnostics; they never raise user-facing
/// alerts.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// The OS refused the registration request.
    #[error("OS refused background registration: {0}")]
    Refused(String),

    /// A required permission is missing.
    #[error("Missing permission: {0}")]
    MissingPermission(String),

    /// Registration is gated off by the current operating mode.
    #[error("Registration blocked: mode is {mode}")]
    ModeBlocked { mode: String },

    /// Registration is gated off by user preference.
    #[error("Registration blocked: context sensing disabled by preference")]
    PreferenceDisabled,
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid coordinate
    #[error("Invalid coordinate for '{field}': {value}")]
    InvalidCoordinate { field: String, value: f64 },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// A saved location with this label already exists.
    #[error("Duplicate place label: {0}")]
    DuplicateLabel(String),
}

// Helper implementations for converting from other error types

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(DatabaseError::from(err))
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for CoreError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        CoreError::Custom(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

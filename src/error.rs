//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout the studio core.
//! All errors are structured and map to stable error codes for JSON output.
//!
//! # Error Categories
//! - `NotFound`: database name or alias does not resolve
//! - `AccessDenied`: resolved access level is below the required capability
//! - `LockHeld`: another session holds the advisory write lock
//! - `EngineBusy`: SQLite raised a busy/locked error despite the advisory layer
//! - `WriteToReadOnly`: writer SQL reached a read-only connection
//! - `BadRequest`: missing or malformed arguments
//! - `Engine`: any other SQLite error, passed through with context
//! - `Internal`: invariant violated inside the core
//! - `Config`: configuration file or data directory errors

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Main error type for studio operations
#[derive(Error, Debug)]
pub enum StudioError {
    /// Database name or alias does not resolve to a discovered database
    #[error("database not found: {0}")]
    NotFound(String),

    /// Resolved access level is below the required capability
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Another session holds the advisory write lock
    #[error("database {database:?} is locked by {holder} (since {})", .since.format("%H:%M"))]
    LockHeld { database: String, holder: String, since: DateTime<Utc> },

    /// SQLite raised a busy/locked error despite the advisory lock layer
    #[error("database busy: {0}")]
    EngineBusy(String),

    /// Writer SQL attempted on a read-only connection
    #[error("database is read-only: {0}")]
    WriteToReadOnly(String),

    /// Missing or malformed arguments
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Any other SQLite error, with context
    #[error("engine error: {0}")]
    Engine(String),

    /// Invariant violated inside the core
    #[error("internal error: {0}")]
    Internal(String),

    /// Configuration error (file not found, invalid JSON, bad data dir)
    #[error("configuration error: {0}")]
    Config(String),
}

impl StudioError {
    /// Convert error to a stable code string for JSON output
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::AccessDenied(_) => "ACCESS_DENIED",
            Self::LockHeld { .. } => "LOCK_HELD",
            Self::EngineBusy(_) => "ENGINE_BUSY",
            Self::WriteToReadOnly(_) => "READ_ONLY",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Engine(_) => "ENGINE_ERROR",
            Self::Internal(_) => "INTERNAL",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Get the human-readable error message
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create a not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create an access-denied error. The message must name the missing
    /// capability ("no write access to ...").
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied(message.into())
    }

    /// Create a bad-request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Create an engine error
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True when the error is SQLite's own busy/locked signal
    #[must_use]
    pub const fn is_engine_busy(&self) -> bool {
        matches!(self, Self::EngineBusy(_))
    }
}

impl From<rusqlite::Error> for StudioError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ffi::ErrorCode;

        if let rusqlite::Error::SqliteFailure(e, ref msg) = err {
            let detail = msg.clone().unwrap_or_else(|| e.to_string());
            return match e.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => Self::EngineBusy(detail),
                ErrorCode::ReadOnly => Self::WriteToReadOnly(detail),
                _ => Self::Engine(detail),
            };
        }

        Self::Engine(err.to_string())
    }
}

/// Result type alias for studio operations
pub type Result<T> = std::result::Result<T, StudioError>;

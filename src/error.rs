//! Error types for ordersync.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, etc.)
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers
//!
//! Record-level and scan-level failures inside a sync run never reach this
//! type: they are absorbed by the engine and reported through the audit log.
//! `Error` covers everything around the run (opening the database, loading
//! configuration, CLI arguments).

use std::path::PathBuf;
use thiserror::Error;

use crate::sync::SyncError;

/// Result type alias for ordersync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    AlreadyInitialized,
    DatabaseError,

    // Not Found (exit 3)
    CursorNotFound,
    UnknownEntity,

    // Validation (exit 4)
    InvalidArgument,

    // Sync (exit 6)
    SyncError,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Remote (exit 9)
    RemoteError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::CursorNotFound => "CURSOR_NOT_FOUND",
            Self::UnknownEntity => "UNKNOWN_ENTITY",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::SyncError => "SYNC_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::RemoteError => "REMOTE_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-9).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::AlreadyInitialized | Self::DatabaseError => 2,
            Self::CursorNotFound | Self::UnknownEntity => 3,
            Self::InvalidArgument => 4,
            Self::SyncError => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
            Self::RemoteError => 9,
        }
    }

    /// Whether retrying the same invocation can succeed without changes.
    ///
    /// True for database contention and remote failures, which are usually
    /// transient.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::DatabaseError | Self::RemoteError | Self::SyncError)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in ordersync operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `ordersync init` first")]
    NotInitialized,

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("No scan cursor stored under '{key}'")]
    CursorNotFound { key: String },

    #[error("Unknown entity: {name}")]
    UnknownEntity { name: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("{entity} {direction} scan aborted: {reason}")]
    ScanAborted {
        entity: String,
        direction: String,
        reason: String,
    },

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::CursorNotFound { .. } => ErrorCode::CursorNotFound,
            Self::UnknownEntity { .. } => ErrorCode::UnknownEntity,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Sync(_) | Self::ScanAborted { .. } => ErrorCode::SyncError,
            Self::Remote(_) => ErrorCode::RemoteError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => {
                Some("Run `ordersync init` to create the database and config file".to_string())
            }

            Self::AlreadyInitialized { path } => Some(format!(
                "Database already exists at {}. Use `--force` to reinitialize.",
                path.display()
            )),

            Self::CursorNotFound { key } => Some(format!(
                "No scan has run under '{key}' yet. Use `ordersync cursor show` to list stored cursors."
            )),

            Self::UnknownEntity { name } => Some(format!(
                "'{name}' has no record mapper. Supported entities: {}",
                crate::sync::SUPPORTED_ENTITIES.join(", ")
            )),

            Self::Config(msg) if msg.contains("url") || msg.contains("consumer") => Some(
                "Set WC_URL, WC_CONSUMER_KEY and WC_CONSUMER_SECRET, or fill the `remote` \
                 section of the config file"
                    .to_string(),
            ),

            Self::ScanAborted { .. } => Some(
                "The cursor kept its position. Fix the cause and run again to resume the scan."
                    .to_string(),
            ),

            Self::InvalidArgument(msg) if msg.contains("direction") => {
                Some("Valid directions: import, export, two-way".to_string())
            }

            Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Config(_)
            | Self::Sync(_)
            | Self::Remote(_)
            | Self::InvalidArgument(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

//! Error types for cardsync.
//!
//! `CardSyncError` is the crate-wide error. Per-file parse failures and
//! thumbnail outcomes have their own types (`ParseError`, `ThumbnailError`)
//! because callers handle them item by item instead of aborting.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the cardsync library.
#[derive(Debug, Error)]
pub enum CardSyncError {
    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Directory enumeration failed under {root}: {message}")]
    Enumeration { root: PathBuf, message: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Index errors
    #[error("Library not found: {library_id}")]
    LibraryNotFound { library_id: String },

    #[error("Card not found: {card_id}")]
    CardNotFound { card_id: String },

    // Watcher errors
    #[error("Watch error for target {target}: {message}")]
    Watch { target: String, message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Background task errors
    #[error("Background task failed: {0}")]
    TaskFailed(String),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for cardsync operations.
pub type Result<T> = std::result::Result<T, CardSyncError>;

impl From<std::io::Error> for CardSyncError {
    fn from(err: std::io::Error) -> Self {
        CardSyncError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for CardSyncError {
    fn from(err: serde_json::Error) -> Self {
        CardSyncError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for CardSyncError {
    fn from(err: rusqlite::Error) -> Self {
        CardSyncError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<notify::Error> for CardSyncError {
    fn from(err: notify::Error) -> Self {
        CardSyncError::Watch {
            target: err
                .paths
                .first()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            message: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for CardSyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        CardSyncError::TaskFailed(err.to_string())
    }
}

impl CardSyncError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        CardSyncError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a watcher error for a target.
    pub fn watch(target: impl Into<String>, err: impl std::fmt::Display) -> Self {
        CardSyncError::Watch {
            target: target.into(),
            message: err.to_string(),
        }
    }

    /// True when this is a SQLite uniqueness violation on the given index.
    ///
    /// `index_columns` is matched against SQLite's constraint message, e.g.
    /// `"cards.library_id, cards.content_hash"`.
    pub fn is_unique_violation_on(&self, index_columns: &str) -> bool {
        match self {
            CardSyncError::Database {
                source: Some(source),
                ..
            } => is_unique_violation_on(source, index_columns),
            _ => false,
        }
    }
}

/// True when a rusqlite error is a UNIQUE constraint failure naming `index_columns`.
pub(crate) fn is_unique_violation_on(err: &rusqlite::Error, index_columns: &str) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, Some(message)) => {
            code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                && message.contains(index_columns)
        }
        _ => false,
    }
}

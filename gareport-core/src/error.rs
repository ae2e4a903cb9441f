//! Error types for gareport-core

use thiserror::Error;

/// Main error type for the gareport-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Storage failure outside of SQLite itself (poisoned lock, catalog backend)
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A count that is not a non-negative whole number
    #[error("malformed {field}: {value:?} is not a non-negative whole number")]
    MalformedInput { field: &'static str, value: String },

    /// Period name that cannot receive ingested data
    #[error("period name {0:?} is reserved")]
    ReservedPeriod(String),

    /// Publisher hierarchy loops back on itself
    #[error("publisher hierarchy cycle at {publisher}: {}", path.join(" -> "))]
    CycleDetected { publisher: String, path: Vec<String> },
}

impl Error {
    pub(crate) fn malformed(field: &'static str, value: impl ToString) -> Self {
        Error::MalformedInput {
            field,
            value: value.to_string(),
        }
    }
}

/// Result type alias for gareport-core
pub type Result<T> = std::result::Result<T, Error>;

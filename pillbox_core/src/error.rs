//! Error types for the pillbox_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for pillbox_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Transport-level webhook failure (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Webhook answered with a non-success status
    #[error("Webhook {url} returned status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// A timestamp string could not be parsed
    #[error("Cannot parse timestamp {value:?}: bad {field}")]
    Parse { field: &'static str, value: String },

    /// Dosing frequency that cannot produce a schedule
    #[error("Schedule error: {0}")]
    Schedule(String),

    /// A webhook row that fails schema validation
    #[error("Malformed record {row}: {reason}")]
    MalformedRecord { row: usize, reason: String },

    /// Named medicine is not on the roster
    #[error("No medicine named {0:?}")]
    NotFound(String),

    /// A medicine with this name is already on the roster
    #[error("{0:?} is already on the list")]
    Duplicate(String),

    /// Dispenser has no pills left for this medicine
    #[error("Dispenser for {0:?} is empty")]
    EmptyBox(String),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

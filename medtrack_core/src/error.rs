//! Error types for the medtrack_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for medtrack_core operations
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

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A medication failed field validation and was not persisted
    #[error("Validation error: {0}")]
    Validation(String),

    /// No medication with the given id
    #[error("Medication not found: {0}")]
    NotFound(String),

    /// Invalid time-slot edit
    #[error("Schedule error: {0}")]
    Schedule(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

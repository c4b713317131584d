//! Error types for TNM

use thiserror::Error;

/// TNM error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Schema error (unknown field, type mismatch, bad counter)
    #[error("Schema error: {0}")]
    Schema(String),

    /// Error reported by a file format backend (Parquet, Arrow, HepMC)
    #[error("Format error: {0}")]
    Format(String),

    /// Object selection error
    #[error("Selection error: {0}")]
    Selection(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

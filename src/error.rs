//! Error types for authflow

use thiserror::Error;

/// Result type alias for authflow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in authflow
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication timed out after {secs} seconds")]
    Timeout { secs: u64 },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid credential record: {0}")]
    InvalidRecord(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

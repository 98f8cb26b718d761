//! Error types for jot-core

use thiserror::Error;

/// Result type alias using jot-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in jot-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local cache unavailable or corrupt
    #[error("Storage error: {0}")]
    Storage(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transient network failure; retry policy belongs to the caller
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Remote rejected our credentials; caller must re-authenticate
    #[error("Not authenticated with the remote server")]
    Unauthenticated,

    /// Remote API returned an unexpected response
    #[error("Remote API error: {0}")]
    Api(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

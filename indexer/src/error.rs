//! Error types for the indexer
//!
//! This module provides error types for the block listener, the index
//! builder and the search service.

use thiserror::Error;

use medchain_index_core::CoreError;

/// Result type for the indexer
pub type Result<T> = std::result::Result<T, IndexerError>;

/// Error type for the indexer
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key-value store error
    #[error("Store error: {0}")]
    Store(String),

    /// Ledger collaborator error
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// A transaction does not carry a recognizable medical record
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Block subscription could not be established or re-established
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// A search request is missing required fields
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Blob fetch or payload decryption error
    #[error("Payload error: {0}")]
    Payload(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Core error
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<redis::RedisError> for IndexerError {
    fn from(err: redis::RedisError) -> Self {
        IndexerError::Store(err.to_string())
    }
}

impl From<reqwest::Error> for IndexerError {
    fn from(err: reqwest::Error) -> Self {
        IndexerError::Ledger(err.to_string())
    }
}

impl From<config::ConfigError> for IndexerError {
    fn from(err: config::ConfigError) -> Self {
        IndexerError::Config(err.to_string())
    }
}

/// Helper function to convert string errors to a store error
pub fn to_store_error<E: ToString>(err: E) -> IndexerError {
    IndexerError::Store(err.to_string())
}

//! Common error types for the suggestion model pipeline

use thiserror::Error;

/// Common result type for suggestion pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the common library and the trainer service
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding of a stored column or ontology file
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input passed to a store or ontology operation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Text tokenizer failed on a record
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

use thiserror::Error;

/// Main error type for cireval
#[derive(Error, Debug)]
pub enum CirevalError {
    /// A query references an image that is not part of the index
    #[error("Missing reference: {0} is not in the index")]
    MissingReference(String),

    /// A retrieval invariant does not hold (duplicate ids, zero or several matches, non-unit features)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration errors (unknown dataset, bad CLI values)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Dataset split files missing or malformed
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Model server / embedding provider errors
    #[error("Embedding provider error: {0}")]
    Embedding(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Feature store errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenient Result type using CirevalError
pub type Result<T> = std::result::Result<T, CirevalError>;

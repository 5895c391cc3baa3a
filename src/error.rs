//! Error types shared by the retrieval and generation core.

use thiserror::Error;

/// Library result type.
pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    /// The vector index was used before `initialize`.
    #[error("vector index is not initialized")]
    NotInitialized,

    /// A vector's length does not match the index dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The model provider returned an error or an unusable payload.
    #[error("upstream call failed: {0}")]
    Upstream(String),

    /// The model provider answered with empty content.
    #[error("upstream returned an empty response")]
    EmptyResponse,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("index encoding error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The geometric index file could not be decoded.
    #[error("corrupt index file: {0}")]
    CorruptIndex(String),

    #[error("configuration error: {0}")]
    Config(String),
}

//! Embedding error types.

use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Transport failure or non-success response
    #[error("API error: {0}")]
    Api(String),

    /// Provider refused the request (4xx other than 429)
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Provider answered 429
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Provider did not answer in time
    #[error("Embedding request timed out after {0}ms")]
    Timeout(u64),

    /// Response body could not be understood
    #[error("Parse error: {0}")]
    Parse(String),

    /// Provider misconfigured (missing key, bad URL)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Provider deliberately unavailable (mock failure injection)
    #[error("Embedding provider unavailable: {0}")]
    Unavailable(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EmbeddingError {
    /// Whether a retry could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EmbeddingError::Api(_) | EmbeddingError::RateLimitExceeded | EmbeddingError::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for EmbeddingError {
    fn from(err: serde_json::Error) -> Self {
        EmbeddingError::Serialization(err.to_string())
    }
}

//! Service error taxonomy.
//!
//! "No data" is never an error; read paths return empty results instead.

use recall_embeddings::EmbeddingError;
use recall_storage::StorageError;
use recall_types::MemoryError;
use recall_vector::VectorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Vector length disagrees with the namespace or deployment dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Embedding provider failed or timed out
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Vector index could not serve the call
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// Backing store failed or timed out on a write
    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    pub fn is_dimension_mismatch(&self) -> bool {
        matches!(self, ServiceError::DimensionMismatch { .. })
    }
}

impl From<VectorError> for ServiceError {
    fn from(err: VectorError) -> Self {
        match err {
            VectorError::DimensionMismatch { expected, actual } => {
                ServiceError::DimensionMismatch { expected, actual }
            }
            VectorError::InvalidInput(msg) => ServiceError::InvalidInput(msg),
            other => ServiceError::IndexUnavailable(other.to_string()),
        }
    }
}

impl From<EmbeddingError> for ServiceError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::DimensionMismatch { expected, actual } => {
                ServiceError::DimensionMismatch { expected, actual }
            }
            EmbeddingError::InvalidInput(msg) => ServiceError::InvalidInput(msg),
            EmbeddingError::Config(msg) => ServiceError::Config(msg),
            other => ServiceError::EmbeddingUnavailable(other.to_string()),
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Key(msg) => ServiceError::InvalidInput(msg),
            other => ServiceError::PersistenceUnavailable(other.to_string()),
        }
    }
}

impl From<MemoryError> for ServiceError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::Config(msg) => ServiceError::Config(msg),
            other => ServiceError::InvalidInput(other.to_string()),
        }
    }
}

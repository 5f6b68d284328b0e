//! Vector store error types.

use recall_storage::StorageError;
use thiserror::Error;

/// Errors that can occur during vector operations.
#[derive(Debug, Error)]
pub enum VectorError {
    /// usearch index error
    #[error("Index error: {0}")]
    Index(String),

    /// Namespace could not be loaded or the index is otherwise unusable
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Rejected input (empty or non-finite vector, bad namespace)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Backing store error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Backing store call exceeded its deadline
    #[error("Backing store timed out after {0}ms")]
    Timeout(u64),
}

impl VectorError {
    /// Everything except bad input means the index could not serve the call.
    pub fn is_unavailable(&self) -> bool {
        !matches!(
            self,
            VectorError::DimensionMismatch { .. } | VectorError::InvalidInput(_)
        )
    }
}

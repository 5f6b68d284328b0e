//! Deadline-bounded embedding calls.

use std::time::Duration;

use recall_embeddings::{EmbeddingError, EmbeddingModel};
use tokio::time::timeout;

use crate::error::ServiceError;

pub(crate) async fn embed_within(
    model: &dyn EmbeddingModel,
    text: &str,
    budget: Duration,
) -> Result<Vec<f32>, ServiceError> {
    match timeout(budget, model.embed(text)).await {
        Ok(result) => Ok(result?.into_vec()),
        Err(_) => Err(EmbeddingError::Timeout(budget.as_millis() as u64).into()),
    }
}

//! Embedding-cache purge job.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use recall_embeddings::EmbeddingCache;

use crate::{SchedulerError, SchedulerService};

pub const JOB_NAME: &str = "embedding_cache_purge";

/// Drop expired embeddings from both cache tiers. Returns the count
/// removed, or `None` when cancelled or failed.
pub async fn run_embedding_purge(
    cache: &EmbeddingCache,
    cancel: &CancellationToken,
) -> Option<usize> {
    if cancel.is_cancelled() {
        return None;
    }
    match cache.purge_expired().await {
        Ok(removed) => {
            info!(removed, "Embedding cache purge complete");
            Some(removed)
        }
        Err(e) => {
            warn!(error = %e, "Embedding cache purge failed");
            None
        }
    }
}

pub async fn create_embedding_purge_job(
    scheduler: &SchedulerService,
    cache: Arc<EmbeddingCache>,
    cron: &str,
) -> Result<uuid::Uuid, SchedulerError> {
    scheduler
        .add_cron_job(JOB_NAME, cron, None, move |cancel| {
            let cache = Arc::clone(&cache);
            async move {
                run_embedding_purge(&cache, &cancel).await;
            }
        })
        .await
}

//! Expired intent-cache decisions are swept lazily on lookup; this job
//! catches the namespaces nobody looks up any more.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use recall_service::SemanticIntentCache;
use recall_vector::SweepStats;

use crate::{SchedulerError, SchedulerService};

pub const JOB_NAME: &str = "intent_cache_sweep";

/// One sweep pass. Failures are logged, never propagated.
pub async fn run_intent_sweep(
    cache: &SemanticIntentCache,
    cancel: &CancellationToken,
) -> Option<SweepStats> {
    if cancel.is_cancelled() {
        return None;
    }
    match cache.sweep_expired().await {
        Ok(stats) => {
            info!(
                namespaces = stats.namespaces_scanned,
                removed = stats.records_removed,
                errors = stats.errors.len(),
                "Intent cache sweep complete"
            );
            Some(stats)
        }
        Err(e) => {
            warn!(error = %e, "Intent cache sweep failed");
            None
        }
    }
}

pub async fn create_intent_sweep_job(
    scheduler: &SchedulerService,
    cache: Arc<SemanticIntentCache>,
    cron: &str,
) -> Result<uuid::Uuid, SchedulerError> {
    scheduler
        .add_cron_job(JOB_NAME, cron, None, move |cancel| {
            let cache = Arc::clone(&cache);
            async move {
                run_intent_sweep(&cache, &cancel).await;
            }
        })
        .await
}

//! Maintenance jobs for the memory layer.
//!
//! - **intent_sweep**: drop expired intent-cache decisions
//! - **retention**: trim every conversation thread to its retention limit
//! - **embedding_purge**: purge expired persistent embedding-cache entries

pub mod embedding_purge;
pub mod intent_sweep;
pub mod retention;

use std::sync::Arc;

use tracing::info;

use recall_service::MemoryContext;
use recall_types::SchedulerSettings;

use crate::{SchedulerError, SchedulerService};

pub use embedding_purge::{create_embedding_purge_job, run_embedding_purge};
pub use intent_sweep::{create_intent_sweep_job, run_intent_sweep};
pub use retention::{create_retention_job, run_retention};

/// Register every maintenance job over the components of `ctx`.
///
/// The intent sweep is skipped while the intent cache is disabled, and the
/// embedding purge while cached embeddings never expire.
pub async fn register_maintenance_jobs(
    scheduler: &SchedulerService,
    ctx: &MemoryContext,
    settings: &SchedulerSettings,
) -> Result<usize, SchedulerError> {
    let mut registered = 0;

    if ctx.intent_cache().is_enabled() {
        create_intent_sweep_job(
            scheduler,
            Arc::clone(ctx.intent_cache()),
            &settings.intent_sweep_cron,
        )
        .await?;
        registered += 1;
    }

    create_retention_job(
        scheduler,
        Arc::clone(ctx.conversations()),
        &settings.retention_cron,
    )
    .await?;
    registered += 1;

    if ctx.settings().embedding_cache.ttl_secs.is_some() {
        create_embedding_purge_job(
            scheduler,
            Arc::clone(ctx.embeddings()),
            &settings.embedding_cache_purge_cron,
        )
        .await?;
        registered += 1;
    }

    info!(registered, "Maintenance jobs registered");
    Ok(registered)
}

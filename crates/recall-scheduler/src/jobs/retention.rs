//! Conversation retention job.
//!
//! Appends soft-trim the thread they touch; this pass also catches threads
//! written before `conversation.max_entries` was lowered.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use recall_service::{ConversationLog, RetentionReport};

use crate::{SchedulerError, SchedulerService};

pub const JOB_NAME: &str = "conversation_retention";

/// One retention pass. Failures are logged, never propagated.
pub async fn run_retention(
    log: &ConversationLog,
    cancel: &CancellationToken,
) -> Option<RetentionReport> {
    if cancel.is_cancelled() {
        return None;
    }
    match log.enforce_retention().await {
        Ok(report) => {
            if !report.errors.is_empty() {
                warn!(errors = report.errors.len(), "Retention pass had failures");
            }
            Some(report)
        }
        Err(e) => {
            warn!(error = %e, "Retention pass failed");
            None
        }
    }
}

pub async fn create_retention_job(
    scheduler: &SchedulerService,
    log: Arc<ConversationLog>,
    cron: &str,
) -> Result<uuid::Uuid, SchedulerError> {
    let max_entries = log.settings().max_entries;
    let uuid = scheduler
        .add_cron_job(JOB_NAME, cron, None, move |cancel| {
            let log = Arc::clone(&log);
            async move {
                run_retention(&log, &cancel).await;
            }
        })
        .await?;
    info!(max_entries, "Registered retention job");
    Ok(uuid)
}

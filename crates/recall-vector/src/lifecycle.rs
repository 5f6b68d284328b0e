//! TTL lifecycle for vector records.
//!
//! A record expires when its `expires_at` metadata (ms since epoch) is at
//! or before "now". Expired records are invisible to callers that check
//! [`is_expired`] and are removed by [`sweep_expired`].

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use recall_types::{Metadata, MetadataValue, Record, META_EXPIRES_AT};

use crate::error::VectorError;
use crate::store::VectorStore;

/// Statistics from a sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepStats {
    pub namespaces_scanned: u32,
    pub records_removed: usize,
    pub errors: Vec<String>,
}

impl SweepStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records_removed == 0 && self.errors.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Expiry instant for a record created at `now` with the given TTL.
pub fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, VectorError> {
    now.checked_add_signed(ttl)
        .ok_or_else(|| VectorError::InvalidInput(format!("ttl of {ttl} overflows the clock")))
}

/// Tag `metadata` so the record expires `ttl` after `now`.
pub fn set_expiry(
    metadata: &mut Metadata,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<(), VectorError> {
    let expires_at = expiry_after(now, ttl)?;
    metadata.insert(
        META_EXPIRES_AT.to_string(),
        MetadataValue::Int(expires_at.timestamp_millis()),
    );
    Ok(())
}

/// Whether `record` has expired at `now`. Records without expiry never do.
pub fn is_expired(record: &Record, now: DateTime<Utc>) -> bool {
    record.is_expired_at(now)
}

/// Delete expired records from every namespace starting with `prefix`.
///
/// Per-namespace failures are collected in the stats; only failing to
/// enumerate namespaces is an error.
pub async fn sweep_expired(
    store: &dyn VectorStore,
    prefix: &str,
    now: DateTime<Utc>,
) -> Result<SweepStats, VectorError> {
    let mut stats = SweepStats::new();
    for namespace in store.namespaces(prefix).await? {
        stats.namespaces_scanned += 1;
        match store
            .delete(&namespace, &move |record: &Record| is_expired(record, now))
            .await
        {
            Ok(removed) => {
                if removed > 0 {
                    debug!(namespace = %namespace, removed, "Swept expired records");
                }
                stats.records_removed += removed;
            }
            Err(e) => {
                warn!(namespace = %namespace, error = %e, "Sweep failed for namespace");
                stats.errors.push(format!("{namespace}: {e}"));
            }
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalVectorStore;
    use recall_storage::Storage;
    use recall_types::{Namespace, VectorSettings};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_set_expiry() {
        let now = Utc::now();
        let mut metadata = Metadata::new();
        set_expiry(&mut metadata, now, Duration::seconds(60)).unwrap();
        let expected = (now + Duration::seconds(60)).timestamp_millis();
        assert_eq!(metadata.get(META_EXPIRES_AT), Some(&MetadataValue::Int(expected)));
    }

    #[test]
    fn test_expiry_overflow_is_rejected() {
        let mut metadata = Metadata::new();
        let err = set_expiry(&mut metadata, Utc::now(), Duration::days(100_000_000)).unwrap_err();
        assert!(matches!(err, VectorError::InvalidInput(_)));
        assert!(metadata.is_empty());
    }

    #[test]
    fn test_sweep_stats() {
        let mut stats = SweepStats::new();
        assert!(stats.is_empty());
        stats.records_removed = 2;
        assert!(!stats.is_empty());
        stats.errors.push("boom".to_string());
        assert!(stats.has_errors());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(dir.path()).unwrap());
        let store = LocalVectorStore::new(storage, VectorSettings::default());
        let ns = Namespace::intent_cache("mark").unwrap();
        let now = Utc::now();

        let mut stale = Metadata::new();
        set_expiry(&mut stale, now - Duration::hours(2), Duration::hours(1)).unwrap();
        let mut fresh = Metadata::new();
        set_expiry(&mut fresh, now, Duration::hours(1)).unwrap();

        store.put(&ns, "stale", vec![1.0, 0.0], stale).await.unwrap();
        store.put(&ns, "fresh", vec![0.0, 1.0], fresh).await.unwrap();
        store.put(&ns, "forever", vec![1.0, 1.0], Metadata::new()).await.unwrap();

        let stats = sweep_expired(&store, "intent-cache:", now).await.unwrap();
        assert_eq!(stats.namespaces_scanned, 1);
        assert_eq!(stats.records_removed, 1);

        let texts: Vec<String> = store.list(&ns).await.unwrap().into_iter().map(|r| r.text).collect();
        assert_eq!(texts, vec!["fresh".to_string(), "forever".to_string()]);
    }
}

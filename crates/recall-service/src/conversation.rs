//! Append-only per-thread conversation log.
//!
//! The store trait is synchronous; the log runs it on the blocking pool
//! under a deadline so one thread's I/O never stalls another.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use recall_storage::{validate_component, Storage, StorageError};
use recall_types::{ConversationEntry, ConversationSettings, Turn};

use crate::error::ServiceError;

/// Durable backing for conversation threads.
pub trait ConversationStore: Send + Sync + 'static {
    /// Append with the next sequence index, atomically.
    fn append(&self, thread_id: &str, turn: Turn) -> Result<ConversationEntry, StorageError>;

    /// Up to `limit` most recent entries, ascending.
    fn read(&self, thread_id: &str, limit: Option<usize>)
        -> Result<Vec<ConversationEntry>, StorageError>;

    /// Evict oldest entries until at most `max_entries` remain.
    fn trim(&self, thread_id: &str, max_entries: usize) -> Result<usize, StorageError>;

    fn threads(&self) -> Result<Vec<String>, StorageError>;
}

impl ConversationStore for Storage {
    fn append(&self, thread_id: &str, turn: Turn) -> Result<ConversationEntry, StorageError> {
        self.append_entry(thread_id, turn)
    }

    fn read(
        &self,
        thread_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationEntry>, StorageError> {
        self.read_entries(thread_id, limit)
    }

    fn trim(&self, thread_id: &str, max_entries: usize) -> Result<usize, StorageError> {
        self.trim_thread(thread_id, max_entries)
    }

    fn threads(&self) -> Result<Vec<String>, StorageError> {
        self.list_threads()
    }
}

/// Result of a retention pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetentionReport {
    pub threads: usize,
    pub removed: usize,
    pub errors: Vec<String>,
}

pub struct ConversationLog {
    store: Arc<dyn ConversationStore>,
    settings: ConversationSettings,
}

impl ConversationLog {
    pub fn new(store: Arc<dyn ConversationStore>, settings: ConversationSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &ConversationSettings {
        &self.settings
    }

    async fn run<T, F>(&self, op: &'static str, f: F) -> Result<T, ServiceError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ConversationStore) -> Result<T, StorageError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let task = tokio::task::spawn_blocking(move || f(store.as_ref()));
        match timeout(Duration::from_millis(self.settings.timeout_ms), task).await {
            Ok(Ok(result)) => result.map_err(ServiceError::from),
            Ok(Err(e)) => Err(ServiceError::PersistenceUnavailable(format!(
                "{op} task failed: {e}"
            ))),
            Err(_) => Err(ServiceError::PersistenceUnavailable(format!(
                "{op} timed out after {}ms",
                self.settings.timeout_ms
            ))),
        }
    }

    /// Append a turn, then soft-trim the thread to the retention limit.
    pub async fn append(&self, thread_id: &str, turn: Turn) -> Result<ConversationEntry, ServiceError> {
        validate_component("thread id", thread_id)?;
        let thread = thread_id.to_string();
        let entry = self
            .run("append", move |store| store.append(&thread, turn))
            .await?;
        debug!(
            thread_id,
            sequence_index = entry.sequence_index,
            role = %entry.role,
            "Appended conversation entry"
        );

        let max = self.settings.max_entries;
        if entry.sequence_index + 1 > max as u64 {
            let thread = thread_id.to_string();
            if let Err(e) = self.run("trim", move |store| store.trim(&thread, max)).await {
                warn!(thread_id, error = %e, "Soft trim after append failed");
            }
        }
        Ok(entry)
    }

    /// Up to `limit` most recent entries (all when `None`), ascending.
    pub async fn read(
        &self,
        thread_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationEntry>, ServiceError> {
        validate_component("thread id", thread_id)?;
        let thread = thread_id.to_string();
        self.run("read", move |store| store.read(&thread, limit)).await
    }

    /// FIFO eviction down to `max_entries`.
    pub async fn trim(&self, thread_id: &str, max_entries: usize) -> Result<usize, ServiceError> {
        validate_component("thread id", thread_id)?;
        let thread = thread_id.to_string();
        let removed = self
            .run("trim", move |store| store.trim(&thread, max_entries))
            .await?;
        if removed > 0 {
            debug!(thread_id, removed, max_entries, "Trimmed thread");
        }
        Ok(removed)
    }

    pub async fn threads(&self) -> Result<Vec<String>, ServiceError> {
        self.run("list threads", |store| store.threads()).await
    }

    /// Trim every known thread to the configured retention limit.
    pub async fn enforce_retention(&self) -> Result<RetentionReport, ServiceError> {
        let mut report = RetentionReport::default();
        for thread in self.threads().await? {
            report.threads += 1;
            match self.trim(&thread, self.settings.max_entries).await {
                Ok(removed) => report.removed += removed,
                Err(e) => {
                    warn!(thread_id = %thread, error = %e, "Retention trim failed");
                    report.errors.push(format!("{thread}: {e}"));
                }
            }
        }
        info!(
            threads = report.threads,
            removed = report.removed,
            "Conversation retention pass complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use recall_types::Role;
    use tempfile::TempDir;

    fn log(settings: ConversationSettings) -> (TempDir, ConversationLog) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(dir.path()).unwrap());
        (dir, ConversationLog::new(storage, settings))
    }

    struct StalledStore;

    impl ConversationStore for StalledStore {
        fn append(&self, _: &str, _: Turn) -> Result<ConversationEntry, StorageError> {
            std::thread::sleep(Duration::from_millis(500));
            Err(StorageError::ColumnFamilyNotFound("conversations".to_string()))
        }

        fn read(&self, _: &str, _: Option<usize>) -> Result<Vec<ConversationEntry>, StorageError> {
            Ok(Vec::new())
        }

        fn trim(&self, _: &str, _: usize) -> Result<usize, StorageError> {
            Ok(0)
        }

        fn threads(&self) -> Result<Vec<String>, StorageError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_append_assigns_sequence() {
        let (_dir, log) = log(ConversationSettings::default());
        let first = log.append("t1", Turn::user("hello")).await.unwrap();
        let second = log.append("t1", Turn::assistant("hi there")).await.unwrap();
        let other = log.append("t2", Turn::user("bonjour")).await.unwrap();

        assert_eq!(first.sequence_index, 0);
        assert_eq!(second.sequence_index, 1);
        assert_eq!(other.sequence_index, 0);

        let entries = log.read("t1", None).await.unwrap();
        let roles: Vec<Role> = entries.iter().map(|e| e.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);

        let mut threads = log.threads().await.unwrap();
        threads.sort();
        assert_eq!(threads, vec!["t1".to_string(), "t2".to_string()]);
    }

    #[tokio::test]
    async fn test_trim_keeps_newest_in_order() {
        let (_dir, log) = log(ConversationSettings::default());
        for i in 0..5 {
            log.append("t", Turn::user(format!("m{i}"))).await.unwrap();
        }
        assert_eq!(log.trim("t", 3).await.unwrap(), 2);

        let entries = log.read("t", None).await.unwrap();
        let seq: Vec<u64> = entries.iter().map(|e| e.sequence_index).collect();
        assert_eq!(seq, vec![2, 3, 4]);
        assert_eq!(entries[0].text(), "m2");

        let latest = log.read("t", Some(1)).await.unwrap();
        assert_eq!(latest[0].sequence_index, 4);
    }

    #[tokio::test]
    async fn test_append_soft_trims() {
        let (_dir, log) = log(ConversationSettings {
            max_entries: 2,
            ..Default::default()
        });
        for i in 0..4 {
            log.append("t", Turn::user(format!("m{i}"))).await.unwrap();
        }
        let seq: Vec<u64> = log
            .read("t", None)
            .await
            .unwrap()
            .iter()
            .map(|e| e.sequence_index)
            .collect();
        assert_eq!(seq, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_append_timeout_is_persistence_error() {
        let log = ConversationLog::new(
            Arc::new(StalledStore),
            ConversationSettings {
                timeout_ms: 20,
                ..Default::default()
            },
        );
        let err = log.append("t", Turn::user("hello")).await.unwrap_err();
        assert!(matches!(err, ServiceError::PersistenceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_rejects_bad_thread_id() {
        let (_dir, log) = log(ConversationSettings::default());
        assert!(matches!(
            log.append("", Turn::user("x")).await,
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            log.append("a|b", Turn::user("x")).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_enforce_retention() {
        let (_dir, log) = log(ConversationSettings {
            max_entries: 1000,
            ..Default::default()
        });
        for i in 0..3 {
            log.append("a", Turn::user(format!("{i}"))).await.unwrap();
        }
        let log = ConversationLog::new(Arc::clone(&log.store), ConversationSettings {
            max_entries: 1,
            ..Default::default()
        });
        let report = log.enforce_retention().await.unwrap();
        assert_eq!(report.threads, 1);
        assert_eq!(report.removed, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_appends_are_gap_free() {
        let (_dir, log) = log(ConversationSettings::default());
        let log = Arc::new(log);
        let mut handles = Vec::new();
        for i in 0..50 {
            let log = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                log.append("busy", Turn::user(format!("msg {i}")))
                    .await
                    .unwrap()
                    .sequence_index
            }));
        }
        let mut seq = Vec::new();
        for handle in handles {
            seq.push(handle.await.unwrap());
        }
        seq.sort();
        assert_eq!(seq, (0..50).collect::<Vec<u64>>());
    }
}

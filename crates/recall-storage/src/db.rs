//! RocksDB wrapper for recall storage.
//!
//! Provides:
//! - Database open with column family setup
//! - Vector store records with per-namespace dimension metadata
//! - Atomic conversation appends (entry + thread head in one WriteBatch)
//! - FIFO trimming of conversation threads
//! - Persistent tier of the embedding cache

use dashmap::DashMap;
use parking_lot::Mutex;
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use recall_types::{ConversationEntry, Record, Turn};

use crate::column_families::{
    build_cf_descriptors, ALL_CF_NAMES, CF_CONVERSATIONS, CF_EMBEDDING_CACHE, CF_NAMESPACES,
    CF_RECORDS, CF_THREAD_HEADS,
};
use crate::error::StorageError;
use crate::keys::{
    validate_component, ConversationKey, EmbeddingKey, NamespaceKey, RecordKey, ThreadHeadKey,
};

/// Persisted facts about a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceMeta {
    /// Vector dimension fixed by the first write
    pub dimension: usize,
    /// Creation time in ms since epoch
    pub created_at_ms: i64,
}

/// Sequence bookkeeping for one conversation thread.
///
/// Live entries are `first..next`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadHead {
    /// Index the next append receives
    pub next: u64,
    /// Oldest retained index
    pub first: u64,
}

impl ThreadHead {
    pub fn len(&self) -> u64 {
        self.next - self.first
    }

    pub fn is_empty(&self) -> bool {
        self.next == self.first
    }
}

/// Main storage interface for recall
pub struct Storage {
    db: DB,
    /// Monotonic ULID source so id order equals insertion order
    id_generator: Mutex<ulid::Generator>,
    /// Serializes appends and trims per thread
    thread_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Storage {
    /// Open storage at the given path, creating if necessary
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(4);

        let cf_descriptors = build_cf_descriptors();
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        Ok(Self {
            db,
            id_generator: Mutex::new(ulid::Generator::new()),
            thread_locks: DashMap::new(),
        })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    /// Generate a new record id, strictly greater than every id before it.
    pub fn next_record_id(&self) -> Result<String, StorageError> {
        self.id_generator
            .lock()
            .generate()
            .map(|id| id.to_string())
            .map_err(|e| StorageError::IdGeneration(e.to_string()))
    }

    // ==================== Record Methods ====================

    /// Store a record. The first record of a namespace also persists the
    /// namespace metadata, in the same batch.
    pub fn put_record(&self, record: &Record) -> Result<(), StorageError> {
        let records_cf = self.cf(CF_RECORDS)?;
        let ns_cf = self.cf(CF_NAMESPACES)?;
        let namespace = record.namespace.as_str();
        validate_component("namespace", namespace)?;

        let mut batch = WriteBatch::default();
        let ns_key = NamespaceKey::to_bytes(namespace);
        if self.db.get_cf(ns_cf, &ns_key)?.is_none() {
            let meta = NamespaceMeta {
                dimension: record.vector.len(),
                created_at_ms: chrono::Utc::now().timestamp_millis(),
            };
            batch.put_cf(ns_cf, &ns_key, serde_json::to_vec(&meta)?);
            debug!(namespace, dimension = meta.dimension, "Registering namespace");
        }

        let key = RecordKey::new(namespace, &record.id);
        batch.put_cf(records_cf, key.to_bytes(), record.to_bytes()?);
        self.db.write(batch)?;

        debug!(namespace, id = %record.id, "Stored record");
        Ok(())
    }

    /// All records of a namespace in insertion order. Records that no
    /// longer decode are skipped.
    pub fn list_records(&self, namespace: &str) -> Result<Vec<Record>, StorageError> {
        let cf = self.cf(CF_RECORDS)?;
        let prefix = RecordKey::namespace_prefix(namespace);

        let mut results = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            match Record::from_bytes(&value) {
                Ok(record) => results.push(record),
                Err(e) => {
                    let id = RecordKey::from_bytes(&key).map(|k| k.id).unwrap_or_default();
                    warn!(namespace, id = %id, error = %e, "Skipping undecodable record");
                }
            }
        }
        Ok(results)
    }

    /// Delete records by id. Returns the number of ids that existed.
    pub fn delete_records(&self, namespace: &str, ids: &[String]) -> Result<usize, StorageError> {
        let cf = self.cf(CF_RECORDS)?;
        let mut batch = WriteBatch::default();
        let mut count = 0;
        for id in ids {
            let key = RecordKey::new(namespace, id.as_str()).to_bytes();
            if self.db.get_cf(cf, &key)?.is_some() {
                batch.delete_cf(cf, &key);
                count += 1;
            }
        }
        if count > 0 {
            self.db.write(batch)?;
            debug!(namespace, count, "Deleted records");
        }
        Ok(count)
    }

    pub fn get_namespace(&self, namespace: &str) -> Result<Option<NamespaceMeta>, StorageError> {
        let cf = self.cf(CF_NAMESPACES)?;
        match self.db.get_cf(cf, NamespaceKey::to_bytes(namespace))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Known namespaces whose name starts with `prefix`.
    pub fn list_namespaces(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, NamespaceMeta)>, StorageError> {
        let cf = self.cf(CF_NAMESPACES)?;
        let key_prefix = NamespaceKey::prefix(prefix);

        let mut results = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&key_prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&key_prefix) {
                break;
            }
            let name = NamespaceKey::from_bytes(&key)?;
            let meta: NamespaceMeta = serde_json::from_slice(&value)?;
            results.push((name, meta));
        }
        Ok(results)
    }

    // ==================== Conversation Methods ====================

    fn thread_lock(&self, thread_id: &str) -> Arc<Mutex<()>> {
        self.thread_locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub fn thread_head(&self, thread_id: &str) -> Result<Option<ThreadHead>, StorageError> {
        let cf = self.cf(CF_THREAD_HEADS)?;
        match self.db.get_cf(cf, ThreadHeadKey::to_bytes(thread_id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Append a turn, assigning the next sequence index.
    ///
    /// The entry and the advanced thread head are written in one batch while
    /// the thread's lock is held, so indices are gap-free and unique.
    pub fn append_entry(
        &self,
        thread_id: &str,
        turn: Turn,
    ) -> Result<ConversationEntry, StorageError> {
        validate_component("thread_id", thread_id)?;
        let conv_cf = self.cf(CF_CONVERSATIONS)?;
        let heads_cf = self.cf(CF_THREAD_HEADS)?;

        let lock = self.thread_lock(thread_id);
        let _guard = lock.lock();

        let mut head = self.thread_head(thread_id)?.unwrap_or_default();
        let entry = ConversationEntry::from_turn(thread_id, head.next, turn);
        head.next += 1;

        let mut batch = WriteBatch::default();
        batch.put_cf(
            conv_cf,
            ConversationKey::new(thread_id, entry.sequence_index).to_bytes(),
            entry.to_bytes()?,
        );
        batch.put_cf(
            heads_cf,
            ThreadHeadKey::to_bytes(thread_id),
            serde_json::to_vec(&head)?,
        );
        self.db.write(batch)?;

        debug!(thread_id, seq = entry.sequence_index, "Appended conversation entry");
        Ok(entry)
    }

    /// Up to `limit` most recent entries (all when `None`), oldest first.
    pub fn read_entries(
        &self,
        thread_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationEntry>, StorageError> {
        validate_component("thread_id", thread_id)?;
        let cf = self.cf(CF_CONVERSATIONS)?;

        let head = match self.thread_head(thread_id)? {
            Some(head) => head,
            None => return Ok(Vec::new()),
        };
        let start = match limit {
            Some(n) => head.next.saturating_sub(n as u64).max(head.first),
            None => head.first,
        };

        let prefix = ConversationKey::thread_prefix(thread_id);
        let start_key = ConversationKey::new(thread_id, start).to_bytes();
        let mut results = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&start_key, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            results.push(ConversationEntry::from_bytes(&value)?);
        }
        Ok(results)
    }

    /// Evict the oldest entries so at most `max_entries` remain.
    ///
    /// Returns the number of entries removed.
    pub fn trim_thread(&self, thread_id: &str, max_entries: usize) -> Result<usize, StorageError> {
        validate_component("thread_id", thread_id)?;
        let conv_cf = self.cf(CF_CONVERSATIONS)?;
        let heads_cf = self.cf(CF_THREAD_HEADS)?;

        let lock = self.thread_lock(thread_id);
        let _guard = lock.lock();

        let mut head = match self.thread_head(thread_id)? {
            Some(head) => head,
            None => return Ok(0),
        };
        if head.len() <= max_entries as u64 {
            return Ok(0);
        }

        let new_first = head.next - max_entries as u64;
        let mut batch = WriteBatch::default();
        for seq in head.first..new_first {
            batch.delete_cf(conv_cf, ConversationKey::new(thread_id, seq).to_bytes());
        }
        let removed = (new_first - head.first) as usize;
        head.first = new_first;
        batch.put_cf(
            heads_cf,
            ThreadHeadKey::to_bytes(thread_id),
            serde_json::to_vec(&head)?,
        );
        self.db.write(batch)?;

        debug!(thread_id, removed, first = head.first, "Trimmed thread");
        Ok(removed)
    }

    /// Every thread that has ever been appended to.
    pub fn list_threads(&self) -> Result<Vec<String>, StorageError> {
        let cf = self.cf(CF_THREAD_HEADS)?;
        let mut threads = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            threads.push(ThreadHeadKey::from_bytes(&key)?);
        }
        Ok(threads)
    }

    // ==================== Embedding Cache Methods ====================

    pub fn get_embedding(&self, digest: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self.cf(CF_EMBEDDING_CACHE)?;
        Ok(self.db.get_cf(cf, EmbeddingKey::to_bytes(digest))?)
    }

    pub fn put_embedding(&self, digest: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let cf = self.cf(CF_EMBEDDING_CACHE)?;
        self.db.put_cf(cf, EmbeddingKey::to_bytes(digest), bytes)?;
        Ok(())
    }

    pub fn delete_embedding(&self, digest: &str) -> Result<(), StorageError> {
        let cf = self.cf(CF_EMBEDDING_CACHE)?;
        self.db.delete_cf(cf, EmbeddingKey::to_bytes(digest))?;
        Ok(())
    }

    /// Delete every persisted embedding whose value matches `is_stale`.
    pub fn purge_embeddings<F>(&self, is_stale: F) -> Result<usize, StorageError>
    where
        F: Fn(&[u8]) -> bool,
    {
        let cf = self.cf(CF_EMBEDDING_CACHE)?;
        let mut batch = WriteBatch::default();
        let mut count = 0;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            if is_stale(&value) {
                batch.delete_cf(cf, &key);
                count += 1;
            }
        }
        if count > 0 {
            self.db.write(batch)?;
            debug!(count, "Purged persisted embeddings");
        }
        Ok(count)
    }

    // ===== Admin Operations =====

    /// Flush all column families to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.flush_cf(cf)?;
            }
        }
        Ok(())
    }

    /// Trigger manual compaction on all column families.
    pub fn compact(&self) -> Result<(), StorageError> {
        info!("Starting full compaction...");
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.compact_range_cf::<&[u8], &[u8]>(cf, None, None);
            }
        }
        info!("Compaction complete");
        Ok(())
    }

    /// Get database statistics.
    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        Ok(StorageStats {
            record_count: self.count_cf_entries(self.cf(CF_RECORDS)?)?,
            namespace_count: self.count_cf_entries(self.cf(CF_NAMESPACES)?)?,
            conversation_entry_count: self.count_cf_entries(self.cf(CF_CONVERSATIONS)?)?,
            thread_count: self.count_cf_entries(self.cf(CF_THREAD_HEADS)?)?,
            embedding_cache_count: self.count_cf_entries(self.cf(CF_EMBEDDING_CACHE)?)?,
            disk_usage_bytes: self.get_disk_usage(),
        })
    }

    fn count_cf_entries(&self, cf: &rocksdb::ColumnFamily) -> Result<u64, StorageError> {
        let mut count = 0u64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn get_disk_usage(&self) -> u64 {
        let mut total_size = 0u64;
        if let Ok(entries) = std::fs::read_dir(self.db.path()) {
            for entry in entries.flatten() {
                if let Ok(metadata) = entry.metadata() {
                    total_size += metadata.len();
                }
            }
        }
        total_size
    }
}

/// Statistics about the storage.
#[derive(Debug, Default, Clone, Serialize)]
pub struct StorageStats {
    /// Vector store records across all namespaces
    pub record_count: u64,
    pub namespace_count: u64,
    /// Retained conversation entries
    pub conversation_entry_count: u64,
    pub thread_count: u64,
    /// Persisted embedding cache entries
    pub embedding_cache_count: u64,
    /// Total disk usage in bytes
    pub disk_usage_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_types::{Metadata, Namespace, Role};
    use tempfile::TempDir;

    fn create_test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::open(temp_dir.path()).unwrap();
        (storage, temp_dir)
    }

    fn record(storage: &Storage, ns: &str, text: &str, vector: Vec<f32>) -> Record {
        Record {
            id: storage.next_record_id().unwrap(),
            namespace: Namespace::new(ns).unwrap(),
            text: text.to_string(),
            vector,
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn test_open_creates_column_families() {
        let (storage, _temp) = create_test_storage();
        for cf_name in ALL_CF_NAMES {
            assert!(
                storage.db.cf_handle(cf_name).is_some(),
                "CF {} should exist",
                cf_name
            );
        }
    }

    #[test]
    fn test_record_ids_are_monotonic() {
        let (storage, _temp) = create_test_storage();
        let mut previous = storage.next_record_id().unwrap();
        for _ in 0..1000 {
            let id = storage.next_record_id().unwrap();
            assert!(id > previous);
            previous = id;
        }
    }

    #[test]
    fn test_put_and_list_records_in_insertion_order() {
        let (storage, _temp) = create_test_storage();
        let texts = ["Prefers aisle seats", "Likes boutique hotels", "Vegetarian"];
        for text in texts {
            let r = record(&storage, "preferences:Mark", text, vec![1.0, 0.0]);
            storage.put_record(&r).unwrap();
        }
        let other = record(&storage, "preferences:Markus", "Window seat", vec![0.0, 1.0]);
        storage.put_record(&other).unwrap();

        let listed = storage.list_records("preferences:Mark").unwrap();
        let listed_texts: Vec<&str> = listed.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(listed_texts, texts);
    }

    #[test]
    fn test_namespace_metadata_set_by_first_write() {
        let (storage, _temp) = create_test_storage();
        assert!(storage.get_namespace("preferences:Mark").unwrap().is_none());

        let r = record(&storage, "preferences:Mark", "a", vec![0.1, 0.2, 0.3]);
        storage.put_record(&r).unwrap();
        let meta = storage.get_namespace("preferences:Mark").unwrap().unwrap();
        assert_eq!(meta.dimension, 3);

        let r = record(&storage, "intent-cache:global", "b", vec![0.1]);
        storage.put_record(&r).unwrap();
        let prefs = storage.list_namespaces("preferences:").unwrap();
        assert_eq!(prefs.len(), 1);
        assert_eq!(prefs[0].0, "preferences:Mark");
        assert_eq!(storage.list_namespaces("").unwrap().len(), 2);
    }

    #[test]
    fn test_list_records_skips_undecodable() {
        let (storage, _temp) = create_test_storage();
        let mut bad = record(&storage, "preferences:Mark", "bad", vec![1.0]);
        bad.metadata
            .insert("score".to_string(), recall_types::MetadataValue::Float(f64::NAN));
        storage.put_record(&bad).unwrap();
        let good = record(&storage, "preferences:Mark", "good", vec![1.0]);
        storage.put_record(&good).unwrap();

        let listed = storage.list_records("preferences:Mark").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, good.id);
    }

    #[test]
    fn test_delete_records() {
        let (storage, _temp) = create_test_storage();
        let a = record(&storage, "preferences:Mark", "a", vec![1.0]);
        let b = record(&storage, "preferences:Mark", "b", vec![1.0]);
        storage.put_record(&a).unwrap();
        storage.put_record(&b).unwrap();

        let removed = storage
            .delete_records("preferences:Mark", &[a.id.clone(), "missing".to_string()])
            .unwrap();
        assert_eq!(removed, 1);
        let left = storage.list_records("preferences:Mark").unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, b.id);
    }

    #[test]
    fn test_append_assigns_gap_free_indices() {
        let (storage, _temp) = create_test_storage();
        for i in 0..5 {
            let entry = storage
                .append_entry("thread-1", Turn::user(format!("message {}", i)))
                .unwrap();
            assert_eq!(entry.sequence_index, i);
        }
        let other = storage.append_entry("thread-2", Turn::assistant("hi")).unwrap();
        assert_eq!(other.sequence_index, 0);

        let entries = storage.read_entries("thread-1", None).unwrap();
        let indices: Vec<u64> = entries.iter().map(|e| e.sequence_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(entries[0].role, Role::User);
    }

    #[test]
    fn test_read_entries_limit_returns_most_recent() {
        let (storage, _temp) = create_test_storage();
        for i in 0..10 {
            storage
                .append_entry("t", Turn::user(format!("m{}", i)))
                .unwrap();
        }
        let entries = storage.read_entries("t", Some(3)).unwrap();
        let texts: Vec<&str> = entries.iter().map(|e| e.text()).collect();
        assert_eq!(texts, vec!["m7", "m8", "m9"]);
        assert!(storage.read_entries("unknown", Some(3)).unwrap().is_empty());
    }

    #[test]
    fn test_trim_keeps_newest_entries() {
        let (storage, _temp) = create_test_storage();
        for i in 0..5 {
            storage
                .append_entry("t", Turn::user(format!("m{}", i)))
                .unwrap();
        }
        assert_eq!(storage.trim_thread("t", 3).unwrap(), 2);
        let entries = storage.read_entries("t", None).unwrap();
        let indices: Vec<u64> = entries.iter().map(|e| e.sequence_index).collect();
        assert_eq!(indices, vec![2, 3, 4]);

        // Trimming again is a no-op; appends continue the sequence
        assert_eq!(storage.trim_thread("t", 3).unwrap(), 0);
        let next = storage.append_entry("t", Turn::user("m5")).unwrap();
        assert_eq!(next.sequence_index, 5);
        assert_eq!(
            storage.thread_head("t").unwrap(),
            Some(ThreadHead { next: 6, first: 2 })
        );
    }

    #[test]
    fn test_append_rejects_bad_thread_id() {
        let (storage, _temp) = create_test_storage();
        assert!(matches!(
            storage.append_entry("a|b", Turn::user("x")),
            Err(StorageError::Key(_))
        ));
        assert!(storage.list_threads().unwrap().is_empty());
    }

    #[test]
    fn test_list_threads() {
        let (storage, _temp) = create_test_storage();
        storage.append_entry("b", Turn::user("x")).unwrap();
        storage.append_entry("a", Turn::user("x")).unwrap();
        assert_eq!(storage.list_threads().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_concurrent_appends_same_thread() {
        let (storage, _temp) = create_test_storage();
        let storage = Arc::new(storage);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let storage = storage.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        storage
                            .append_entry("shared", Turn::user(format!("{}-{}", t, i)))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let entries = storage.read_entries("shared", None).unwrap();
        let indices: Vec<u64> = entries.iter().map(|e| e.sequence_index).collect();
        assert_eq!(indices, (0..200).collect::<Vec<u64>>());
    }

    #[test]
    fn test_embedding_cache_roundtrip_and_purge() {
        let (storage, _temp) = create_test_storage();
        storage.put_embedding("aa", b"keep").unwrap();
        storage.put_embedding("bb", b"stale").unwrap();
        assert_eq!(storage.get_embedding("aa").unwrap(), Some(b"keep".to_vec()));

        let purged = storage.purge_embeddings(|v| v == b"stale").unwrap();
        assert_eq!(purged, 1);
        assert!(storage.get_embedding("bb").unwrap().is_none());

        storage.delete_embedding("aa").unwrap();
        assert!(storage.get_embedding("aa").unwrap().is_none());
    }

    #[test]
    fn test_stats() {
        let (storage, _temp) = create_test_storage();
        let r = record(&storage, "preferences:Mark", "a", vec![1.0]);
        storage.put_record(&r).unwrap();
        storage.append_entry("t", Turn::user("x")).unwrap();
        storage.put_embedding("aa", b"v").unwrap();

        let stats = storage.get_stats().unwrap();
        assert_eq!(stats.record_count, 1);
        assert_eq!(stats.namespace_count, 1);
        assert_eq!(stats.conversation_entry_count, 1);
        assert_eq!(stats.thread_count, 1);
        assert_eq!(stats.embedding_cache_count, 1);
    }

    #[test]
    fn test_reopen_preserves_data() {
        let temp_dir = TempDir::new().unwrap();
        {
            let storage = Storage::open(temp_dir.path()).unwrap();
            storage.append_entry("t", Turn::user("first")).unwrap();
            storage.flush().unwrap();
        }
        let storage = Storage::open(temp_dir.path()).unwrap();
        let entry = storage.append_entry("t", Turn::user("second")).unwrap();
        assert_eq!(entry.sequence_index, 1);
    }
}

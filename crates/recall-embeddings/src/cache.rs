//! Embedding cache.
//!
//! Memoizes text -> vector lookups keyed by a BLAKE3 digest of the model
//! name and the exact text. Two tiers:
//! - a bounded in-memory LRU
//! - an optional persistent tier in the backing store
//!
//! A persistent-tier failure never fails a lookup; it is logged and treated
//! as a miss.

use async_trait::async_trait;
use chrono::Utc;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use recall_storage::Storage;
use recall_types::EmbeddingCacheSettings;

use crate::error::EmbeddingError;
use crate::model::{Embedding, EmbeddingModel, ModelInfo};

/// Persisted form of a cached embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedEmbedding {
    values: Vec<f32>,
    model: String,
    created_at_ms: i64,
    #[serde(default)]
    expires_at_ms: Option<i64>,
}

impl CachedEmbedding {
    fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at_ms.map(|e| e <= now_ms).unwrap_or(false)
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Hits served by the persistent tier (subset of `hits`)
    pub persistent_hits: u64,
    /// Entries currently in the in-memory tier
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Expiry for an entry cached at `now_ms`. A TTL past the end of the
/// clock means the entry lives until evicted.
fn expires_at_ms(now_ms: i64, ttl: Duration) -> Option<i64> {
    i64::try_from(ttl.as_millis())
        .ok()
        .and_then(|ttl_ms| now_ms.checked_add(ttl_ms))
}

/// Cache key: hex BLAKE3 digest of `model \0 text`.
pub fn cache_key(model: &str, text: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(model.as_bytes());
    hasher.update(&[0]);
    hasher.update(text.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Two-tier embedding cache wrapping a provider.
pub struct EmbeddingCache {
    inner: Arc<dyn EmbeddingModel>,
    memory: Mutex<LruCache<String, CachedEmbedding>>,
    storage: Option<Arc<Storage>>,
    ttl: Option<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
    persistent_hits: AtomicU64,
}

impl EmbeddingCache {
    /// In-memory only cache.
    pub fn new(inner: Arc<dyn EmbeddingModel>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            memory: Mutex::new(LruCache::new(capacity)),
            storage: None,
            ttl: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            persistent_hits: AtomicU64::new(0),
        }
    }

    /// Build from settings; `storage` is used only when `persistent` is set.
    pub fn from_settings(
        inner: Arc<dyn EmbeddingModel>,
        settings: &EmbeddingCacheSettings,
        storage: Option<Arc<Storage>>,
    ) -> Self {
        let mut cache = Self::new(inner, settings.capacity)
            .with_ttl(settings.ttl_secs.map(Duration::from_secs));
        if settings.persistent {
            if let Some(storage) = storage {
                cache = cache.with_storage(storage);
            }
        }
        cache
    }

    pub fn with_storage(mut self, storage: Arc<Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            persistent_hits: self.persistent_hits.load(Ordering::Relaxed),
            entries: self.memory.lock().len(),
        }
    }

    /// Look up `text`, calling the provider on a miss.
    pub async fn get(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let key = cache_key(&self.inner.info().name, text);
        let now_ms = Utc::now().timestamp_millis();

        if let Some(values) = self.memory_lookup(&key, now_ms) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Embedding::from_raw(values));
        }

        if let Some(entry) = self.persistent_lookup(&key, now_ms).await {
            let values = entry.values.clone();
            self.memory.lock().put(key, entry);
            self.hits.fetch_add(1, Ordering::Relaxed);
            self.persistent_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Embedding::from_raw(values));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let embedding = self.inner.embed(text).await?;

        let entry = CachedEmbedding {
            values: embedding.values.clone(),
            model: self.inner.info().name.clone(),
            created_at_ms: now_ms,
            expires_at_ms: self.ttl.and_then(|ttl| expires_at_ms(now_ms, ttl)),
        };
        self.persistent_store(&key, &entry).await;
        self.memory.lock().put(key, entry);
        debug!(model = %self.inner.info().name, "Embedding cache miss stored");

        Ok(embedding)
    }

    fn memory_lookup(&self, key: &str, now_ms: i64) -> Option<Vec<f32>> {
        let mut memory = self.memory.lock();
        let expired = match memory.get(key) {
            Some(entry) if !entry.is_expired_at(now_ms) => return Some(entry.values.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            memory.pop(key);
        }
        None
    }

    async fn persistent_lookup(&self, key: &str, now_ms: i64) -> Option<CachedEmbedding> {
        let storage = self.storage.clone()?;
        let digest = key.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let bytes = storage.get_embedding(&digest)?;
            let entry = match bytes {
                Some(bytes) => serde_json::from_slice::<CachedEmbedding>(&bytes).ok(),
                None => None,
            };
            if let Some(entry) = &entry {
                if entry.is_expired_at(now_ms) {
                    storage.delete_embedding(&digest)?;
                    return Ok(None);
                }
            }
            Ok::<_, recall_storage::StorageError>(entry)
        })
        .await;

        match result {
            Ok(Ok(entry)) => entry,
            Ok(Err(e)) => {
                warn!(error = %e, "Persistent embedding cache read failed, treating as miss");
                None
            }
            Err(e) => {
                warn!(error = %e, "Persistent embedding cache task failed");
                None
            }
        }
    }

    async fn persistent_store(&self, key: &str, entry: &CachedEmbedding) {
        let storage = match &self.storage {
            Some(storage) => storage.clone(),
            None => return,
        };
        let bytes = match serde_json::to_vec(entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to encode embedding for persistent cache");
                return;
            }
        };
        let digest = key.to_string();
        let result =
            tokio::task::spawn_blocking(move || storage.put_embedding(&digest, &bytes)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Persistent embedding cache write failed"),
            Err(e) => warn!(error = %e, "Persistent embedding cache task failed"),
        }
    }

    /// Drop expired entries from both tiers. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<usize, EmbeddingError> {
        let now_ms = Utc::now().timestamp_millis();
        let mut removed = {
            let mut memory = self.memory.lock();
            let expired: Vec<String> = memory
                .iter()
                .filter(|(_, entry)| entry.is_expired_at(now_ms))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &expired {
                memory.pop(key);
            }
            expired.len()
        };

        if let Some(storage) = self.storage.clone() {
            let purged = tokio::task::spawn_blocking(move || {
                storage.purge_embeddings(|bytes| {
                    serde_json::from_slice::<CachedEmbedding>(bytes)
                        .map(|entry| entry.is_expired_at(now_ms))
                        .unwrap_or(true)
                })
            })
            .await
            .map_err(|e| EmbeddingError::Api(format!("purge task failed: {}", e)))?
            .map_err(|e| EmbeddingError::Api(format!("purge failed: {}", e)))?;
            removed += purged;
        }

        debug!(removed, "Purged expired embeddings");
        Ok(removed)
    }
}

#[async_trait]
impl EmbeddingModel for EmbeddingCache {
    fn info(&self) -> &ModelInfo {
        self.inner.info()
    }

    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.get(text).await
    }
}

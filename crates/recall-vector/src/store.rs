//! Namespaced vector store.
//!
//! Records are durable in the backing store; each namespace keeps an
//! in-memory index that is built from those records the first time the
//! namespace is touched. Searches always re-rank candidates with exact
//! cosine distance, so exact and HNSW mode share one ordering contract:
//! ascending distance, then newest timestamp, then newest id.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use recall_embeddings::cosine_distance;
use recall_storage::{Storage, StorageError};
use recall_types::{
    CacheHit, Metadata, MetadataValue, Namespace, Record, RecordId, SearchMode, VectorSettings,
    META_TIMESTAMP,
};

use crate::error::VectorError;
use crate::hnsw::{HnswConfig, HnswIndex};
use crate::index::{FlatIndex, VectorIndex};

/// Append/query store over namespaced `(text, vector, metadata)` records.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Store a record and return its generated id.
    async fn put(
        &self,
        namespace: &Namespace,
        text: &str,
        vector: Vec<f32>,
        metadata: Metadata,
    ) -> Result<RecordId, VectorError>;

    /// At most `k` records within `max_distance` of `query`, closest first.
    async fn search(
        &self,
        namespace: &Namespace,
        query: &[f32],
        k: usize,
        max_distance: f32,
    ) -> Result<Vec<CacheHit>, VectorError>;

    /// Remove every record matching `predicate`. Returns the count removed.
    async fn delete(
        &self,
        namespace: &Namespace,
        predicate: &(dyn Fn(&Record) -> bool + Send + Sync),
    ) -> Result<usize, VectorError>;

    /// All records in insertion order.
    async fn list(&self, namespace: &Namespace) -> Result<Vec<Record>, VectorError>;

    /// Known namespaces whose name starts with `prefix`.
    async fn namespaces(&self, prefix: &str) -> Result<Vec<Namespace>, VectorError>;

    /// Dimension of a namespace, `None` until its first write.
    async fn dimension(&self, namespace: &Namespace) -> Result<Option<usize>, VectorError>;
}

/// In-memory view of one namespace.
struct NamespaceIndex {
    dimension: Option<usize>,
    /// id -> slot, ordered by id (insertion order)
    ids: BTreeMap<RecordId, u64>,
    /// slot -> record
    records: HashMap<u64, Record>,
    next_slot: u64,
    ann: Option<Box<dyn VectorIndex>>,
}

impl NamespaceIndex {
    fn empty(dimension: Option<usize>) -> Self {
        Self {
            dimension,
            ids: BTreeMap::new(),
            records: HashMap::new(),
            next_slot: 0,
            ann: None,
        }
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn insert(&mut self, record: Record, settings: &VectorSettings) -> Result<(), VectorError> {
        let dimension = record.vector.len();
        if self.ann.is_none() {
            self.ann = Some(new_index(dimension, settings)?);
            self.dimension.get_or_insert(dimension);
        }
        let slot = self.next_slot;
        if let Some(ann) = self.ann.as_mut() {
            ann.add(slot, &record.vector)?;
        }
        self.next_slot += 1;
        self.ids.insert(record.id.clone(), slot);
        self.records.insert(slot, record);
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Result<(), VectorError> {
        if let Some(slot) = self.ids.remove(id) {
            self.records.remove(&slot);
            if let Some(ann) = self.ann.as_mut() {
                ann.remove(slot)?;
            }
        }
        Ok(())
    }

    fn ordered(&self) -> impl Iterator<Item = &Record> {
        self.ids.values().filter_map(|slot| self.records.get(slot))
    }
}

fn new_index(dimension: usize, settings: &VectorSettings) -> Result<Box<dyn VectorIndex>, VectorError> {
    Ok(match settings.mode {
        SearchMode::Exact => Box::new(FlatIndex::new(dimension)),
        SearchMode::Hnsw => Box::new(HnswIndex::new(HnswConfig::from_settings(dimension, settings))?),
    })
}

/// Ranking: distance ascending, then newest timestamp, then newest id.
fn rank(a: &CacheHit, b: &CacheHit) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| b.record.timestamp_ms().cmp(&a.record.timestamp_ms()))
        .then_with(|| b.record.id.cmp(&a.record.id))
}

type NamespaceSlot = Arc<RwLock<Option<NamespaceIndex>>>;

struct Inner {
    storage: Arc<Storage>,
    settings: VectorSettings,
    fixed_dimension: Option<usize>,
    timeout: Duration,
    namespaces: DashMap<String, NamespaceSlot>,
    #[cfg(test)]
    stall_ms: std::sync::atomic::AtomicU64,
}

/// [`VectorStore`] over the RocksDB backing store.
#[derive(Clone)]
pub struct LocalVectorStore {
    inner: Arc<Inner>,
}

impl LocalVectorStore {
    pub fn new(storage: Arc<Storage>, settings: VectorSettings) -> Self {
        Self::build(storage, settings, None)
    }

    /// Require every namespace to use `dimension`.
    pub fn with_fixed_dimension(
        storage: Arc<Storage>,
        settings: VectorSettings,
        dimension: usize,
    ) -> Self {
        Self::build(storage, settings, Some(dimension))
    }

    fn build(storage: Arc<Storage>, settings: VectorSettings, fixed_dimension: Option<usize>) -> Self {
        let timeout = Duration::from_millis(settings.timeout_ms);
        Self {
            inner: Arc::new(Inner {
                storage,
                settings,
                fixed_dimension,
                timeout,
                namespaces: DashMap::new(),
                #[cfg(test)]
                stall_ms: std::sync::atomic::AtomicU64::new(0),
            }),
        }
    }

    pub fn settings(&self) -> &VectorSettings {
        &self.inner.settings
    }

    /// Number of namespaces currently held in memory.
    pub fn loaded_namespaces(&self) -> usize {
        self.inner.namespaces.len()
    }

    /// Delay every backing store call by `ms`, on the blocking thread.
    #[cfg(test)]
    fn stall(&self, ms: u64) {
        self.inner
            .stall_ms
            .store(ms, std::sync::atomic::Ordering::Relaxed);
    }

    async fn blocking<T, F>(&self, op: &'static str, f: F) -> Result<T, VectorError>
    where
        T: Send + 'static,
        F: FnOnce(&Storage) -> Result<T, StorageError> + Send + 'static,
    {
        let storage = self.inner.storage.clone();
        #[cfg(test)]
        let stall = Duration::from_millis(
            self.inner
                .stall_ms
                .load(std::sync::atomic::Ordering::Relaxed),
        );
        let task = tokio::task::spawn_blocking(move || {
            #[cfg(test)]
            std::thread::sleep(stall);
            f(&storage)
        });
        match tokio::time::timeout(self.inner.timeout, task).await {
            Ok(Ok(result)) => result.map_err(VectorError::from),
            Ok(Err(e)) => Err(VectorError::IndexUnavailable(format!("{op} task failed: {e}"))),
            Err(_) => {
                warn!(op, timeout_ms = self.inner.settings.timeout_ms, "Backing store call timed out");
                Err(VectorError::Timeout(self.inner.settings.timeout_ms))
            }
        }
    }

    async fn load(&self, namespace: &Namespace) -> Result<NamespaceIndex, VectorError> {
        let name = namespace.as_str().to_string();
        let (meta, records) = self
            .blocking("load namespace", move |storage| {
                let meta = storage.get_namespace(&name)?;
                let records = match meta {
                    Some(_) => storage.list_records(&name)?,
                    None => Vec::new(),
                };
                Ok((meta, records))
            })
            .await
            .map_err(|e| VectorError::IndexUnavailable(format!("loading {namespace}: {e}")))?;

        let mut index = NamespaceIndex::empty(meta.map(|m| m.dimension));
        let count = records.len();
        for record in records {
            index.insert(record, &self.inner.settings)?;
        }
        if count > 0 {
            info!(namespace = %namespace, records = count, "Rebuilt namespace index");
        }
        Ok(index)
    }

    /// Namespace slot with its index loaded. A failed load leaves the slot
    /// empty so the next access retries.
    async fn loaded(&self, namespace: &Namespace) -> Result<NamespaceSlot, VectorError> {
        let slot = self
            .inner
            .namespaces
            .entry(namespace.as_str().to_string())
            .or_insert_with(|| Arc::new(RwLock::new(None)))
            .clone();

        if slot.read().await.is_some() {
            return Ok(slot);
        }

        let mut guard = slot.write().await;
        if guard.is_none() {
            *guard = Some(self.load(namespace).await?);
        }
        drop(guard);
        Ok(slot)
    }

    fn check_metadata(metadata: &Metadata) -> Result<(), VectorError> {
        match metadata.iter().find(|(_, value)| !value.is_finite()) {
            Some((key, _)) => Err(VectorError::InvalidInput(format!(
                "metadata {key:?} is not a finite number"
            ))),
            None => Ok(()),
        }
    }

    fn check_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.is_empty() {
            return Err(VectorError::InvalidInput("vector must not be empty".to_string()));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(VectorError::InvalidInput("vector contains non-finite values".to_string()));
        }
        if let Some(expected) = self.inner.fixed_dimension {
            if expected != vector.len() {
                return Err(VectorError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn put(
        &self,
        namespace: &Namespace,
        text: &str,
        vector: Vec<f32>,
        mut metadata: Metadata,
    ) -> Result<RecordId, VectorError> {
        self.check_vector(&vector)?;
        Self::check_metadata(&metadata)?;

        let slot = self.loaded(namespace).await?;
        let mut guard = slot.write().await;
        let dimension = guard
            .as_ref()
            .ok_or_else(|| VectorError::IndexUnavailable(format!("{namespace} not loaded")))?
            .dimension;

        if let Some(expected) = dimension {
            if expected != vector.len() {
                return Err(VectorError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        metadata
            .entry(META_TIMESTAMP.to_string())
            .or_insert_with(|| MetadataValue::Int(chrono::Utc::now().timestamp_millis()));

        let id = self.inner.storage.next_record_id()?;
        let record = Record {
            id: id.clone(),
            namespace: namespace.clone(),
            text: text.to_string(),
            vector,
            metadata,
        };

        // The slot stays empty until the index matches durable state again,
        // so a timed out or dropped write is rebuilt on next access.
        let mut state = guard
            .take()
            .ok_or_else(|| VectorError::IndexUnavailable(format!("{namespace} not loaded")))?;
        let durable = record.clone();
        self.blocking("put record", move |storage| storage.put_record(&durable))
            .await?;

        if let Err(e) = state.insert(record, &self.inner.settings) {
            warn!(namespace = %namespace, error = %e, "Index insert failed, dropping namespace index");
            return Err(e);
        }
        *guard = Some(state);

        debug!(namespace = %namespace, id = %id, "Stored vector record");
        Ok(id)
    }

    async fn search(
        &self,
        namespace: &Namespace,
        query: &[f32],
        k: usize,
        max_distance: f32,
    ) -> Result<Vec<CacheHit>, VectorError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let slot = self.loaded(namespace).await?;
        let guard = slot.read().await;
        let state = match guard.as_ref() {
            Some(state) => state,
            None => return Ok(Vec::new()),
        };
        let (dimension, ann) = match (state.dimension, state.ann.as_ref()) {
            (Some(dimension), Some(ann)) => (dimension, ann),
            _ => return Ok(Vec::new()),
        };
        if dimension != query.len() {
            return Err(VectorError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }

        let candidates = match self.inner.settings.mode {
            SearchMode::Exact => state.len(),
            SearchMode::Hnsw => state.len().min(
                k.saturating_mul(self.inner.settings.oversample.max(1))
                    .max(self.inner.settings.expansion_search),
            ),
        };

        let mut hits: Vec<CacheHit> = ann
            .search(query, candidates)?
            .into_iter()
            .filter_map(|result| state.records.get(&result.key))
            .map(|record| (record, cosine_distance(query, &record.vector)))
            .filter(|(_, distance)| *distance <= max_distance)
            .map(|(record, distance)| CacheHit::new(record.clone(), distance))
            .collect();

        hits.sort_by(rank);
        hits.truncate(k);
        Ok(hits)
    }

    async fn delete(
        &self,
        namespace: &Namespace,
        predicate: &(dyn Fn(&Record) -> bool + Send + Sync),
    ) -> Result<usize, VectorError> {
        let slot = self.loaded(namespace).await?;
        let mut guard = slot.write().await;
        let Some(state) = guard.as_ref() else {
            return Ok(0);
        };

        let doomed: Vec<RecordId> = state
            .ordered()
            .filter(|record| predicate(record))
            .map(|record| record.id.clone())
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }

        let mut state = match guard.take() {
            Some(state) => state,
            None => return Ok(0),
        };
        let name = namespace.as_str().to_string();
        let ids = doomed.clone();
        self.blocking("delete records", move |storage| storage.delete_records(&name, &ids))
            .await?;

        let mut intact = true;
        for id in &doomed {
            if let Err(e) = state.remove(id) {
                warn!(namespace = %namespace, error = %e, "Index remove failed, dropping namespace index");
                intact = false;
                break;
            }
        }
        if intact {
            *guard = Some(state);
        }

        debug!(namespace = %namespace, count = doomed.len(), "Deleted vector records");
        Ok(doomed.len())
    }

    async fn list(&self, namespace: &Namespace) -> Result<Vec<Record>, VectorError> {
        let slot = self.loaded(namespace).await?;
        let guard = slot.read().await;
        Ok(guard
            .as_ref()
            .map(|state| state.ordered().cloned().collect())
            .unwrap_or_default())
    }

    async fn namespaces(&self, prefix: &str) -> Result<Vec<Namespace>, VectorError> {
        let prefix = prefix.to_string();
        let found = self
            .blocking("list namespaces", move |storage| storage.list_namespaces(&prefix))
            .await?;

        let mut namespaces = Vec::with_capacity(found.len());
        for (name, _) in found {
            match Namespace::new(name.clone()) {
                Ok(ns) => namespaces.push(ns),
                Err(e) => warn!(namespace = %name, error = %e, "Skipping malformed namespace"),
            }
        }
        Ok(namespaces)
    }

    async fn dimension(&self, namespace: &Namespace) -> Result<Option<usize>, VectorError> {
        let slot = self.loaded(namespace).await?;
        let guard = slot.read().await;
        Ok(guard.as_ref().and_then(|state| state.dimension))
    }
}

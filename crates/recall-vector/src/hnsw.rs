//! HNSW index implementation using usearch.
//!
//! The graph lives in memory only; it is rebuilt from the durable records
//! when a namespace is first touched after start-up.
//!
//! Defaults aim at >= 0.95 recall for namespaces of a few thousand vectors:
//! - M = 16 (connections per layer)
//! - ef_construction = 128
//! - ef_search = 64

use tracing::debug;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use recall_types::VectorSettings;

use crate::error::VectorError;
use crate::index::{check_dimension, SearchResult, VectorIndex};

/// Initial slot reservation; grows by doubling.
const INITIAL_CAPACITY: usize = 64;

/// HNSW index configuration
#[derive(Debug, Clone)]
pub struct HnswConfig {
    /// Embedding dimension (must match the namespace)
    pub dimension: usize,
    /// Number of connections per layer (M parameter)
    pub connectivity: usize,
    /// Build-time search depth (ef_construction)
    pub expansion_add: usize,
    /// Query-time search depth (ef_search)
    pub expansion_search: usize,
    /// Initial capacity (for pre-allocation)
    pub capacity: usize,
}

impl HnswConfig {
    pub fn from_settings(dimension: usize, settings: &VectorSettings) -> Self {
        Self {
            dimension,
            connectivity: settings.connectivity,
            expansion_add: settings.expansion_add,
            expansion_search: settings.expansion_search,
            capacity: INITIAL_CAPACITY,
        }
    }

    fn options(&self) -> IndexOptions {
        IndexOptions {
            dimensions: self.dimension,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: self.connectivity,
            expansion_add: self.expansion_add,
            expansion_search: self.expansion_search,
            multi: false,
        }
    }
}

/// HNSW index wrapper around usearch.
pub struct HnswIndex {
    index: Index,
    config: HnswConfig,
    /// Slots consumed so far; removed keys keep theirs
    inserted: usize,
}

impl HnswIndex {
    pub fn new(config: HnswConfig) -> Result<Self, VectorError> {
        let index = Index::new(&config.options()).map_err(|e| VectorError::Index(e.to_string()))?;
        index
            .reserve(config.capacity.max(1))
            .map_err(|e| VectorError::Index(e.to_string()))?;
        debug!(dim = config.dimension, "Created HNSW index");
        Ok(Self {
            index,
            config,
            inserted: 0,
        })
    }

    fn ensure_capacity(&self) -> Result<(), VectorError> {
        let needed = self.inserted + 1;
        if needed > self.index.capacity() {
            let target = (self.index.capacity() * 2).max(INITIAL_CAPACITY).max(needed);
            self.index
                .reserve(target)
                .map_err(|e| VectorError::Index(e.to_string()))?;
            debug!(capacity = target, "Grew HNSW index");
        }
        Ok(())
    }
}

impl VectorIndex for HnswIndex {
    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn len(&self) -> usize {
        self.index.size()
    }

    fn add(&mut self, key: u64, vector: &[f32]) -> Result<(), VectorError> {
        check_dimension(self.config.dimension, vector.len())?;
        self.ensure_capacity()?;
        self.index
            .add(key, vector)
            .map_err(|e| VectorError::Index(e.to_string()))?;
        self.inserted += 1;
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, VectorError> {
        check_dimension(self.config.dimension, query.len())?;
        if k == 0 || self.index.size() == 0 {
            return Ok(Vec::new());
        }

        let matches = self
            .index
            .search(query, k)
            .map_err(|e| VectorError::Index(e.to_string()))?;

        Ok(matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            .map(|(&key, &distance)| SearchResult::new(key, distance))
            .collect())
    }

    fn remove(&mut self, key: u64) -> Result<bool, VectorError> {
        let removed = self
            .index
            .remove(key)
            .map_err(|e| VectorError::Index(e.to_string()))?;
        Ok(removed > 0)
    }
}

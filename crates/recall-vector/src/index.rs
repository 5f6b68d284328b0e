//! Vector index trait and the exact (flat) index.
//!
//! Indexes are keyed by a per-namespace `u64` slot and report cosine
//! distance (`1 - cosine similarity`), lower is closer.

use std::collections::BTreeMap;

use recall_embeddings::cosine_distance;

use crate::error::VectorError;

/// Result of a vector search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Slot key of the vector
    pub key: u64,
    /// Cosine distance to the query
    pub distance: f32,
}

impl SearchResult {
    pub fn new(key: u64, distance: f32) -> Self {
        Self { key, distance }
    }
}

/// Trait for vector indexes.
///
/// Implementations must be thread-safe for concurrent read access.
pub trait VectorIndex: Send + Sync {
    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the number of vectors in the index
    fn len(&self) -> usize;

    /// Check if the index is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a vector under `key`.
    fn add(&mut self, key: u64, vector: &[f32]) -> Result<(), VectorError>;

    /// Up to `k` nearest candidates, closest first.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, VectorError>;

    /// Remove a vector by key.
    fn remove(&mut self, key: u64) -> Result<bool, VectorError>;
}

pub(crate) fn check_dimension(expected: usize, actual: usize) -> Result<(), VectorError> {
    if expected != actual {
        return Err(VectorError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// Exact index: linear scan over every vector.
pub struct FlatIndex {
    dimension: usize,
    vectors: BTreeMap<u64, Vec<f32>>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: BTreeMap::new(),
        }
    }
}

impl VectorIndex for FlatIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn add(&mut self, key: u64, vector: &[f32]) -> Result<(), VectorError> {
        check_dimension(self.dimension, vector.len())?;
        self.vectors.insert(key, vector.to_vec());
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, VectorError> {
        check_dimension(self.dimension, query.len())?;
        let mut results: Vec<SearchResult> = self
            .vectors
            .iter()
            .map(|(&key, vector)| SearchResult::new(key, cosine_distance(query, vector)))
            .collect();
        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        results.truncate(k);
        Ok(results)
    }

    fn remove(&mut self, key: u64) -> Result<bool, VectorError> {
        Ok(self.vectors.remove(&key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_search_orders_by_distance() {
        let mut index = FlatIndex::new(2);
        index.add(1, &[1.0, 0.0]).unwrap();
        index.add(2, &[0.0, 1.0]).unwrap();
        index.add(3, &[0.7, 0.7]).unwrap();

        let results = index.search(&[1.0, 0.1], 3).unwrap();
        let keys: Vec<u64> = results.iter().map(|r| r.key).collect();
        assert_eq!(keys, vec![1, 3, 2]);
        assert!(results[0].distance < 0.01);
    }

    #[test]
    fn test_flat_k_bound_and_remove() {
        let mut index = FlatIndex::new(2);
        for key in 0..5 {
            index.add(key, &[1.0, key as f32]).unwrap();
        }
        assert_eq!(index.search(&[1.0, 0.0], 2).unwrap().len(), 2);
        assert!(index.remove(0).unwrap());
        assert!(!index.remove(0).unwrap());
        assert_eq!(index.len(), 4);
        assert!(index.search(&[1.0, 0.0], 5).unwrap().iter().all(|r| r.key != 0));
    }

    #[test]
    fn test_flat_dimension_mismatch() {
        let mut index = FlatIndex::new(3);
        assert!(matches!(
            index.add(0, &[1.0]),
            Err(VectorError::DimensionMismatch {
                expected: 3,
                actual: 1
            })
        ));
        assert!(index.search(&[1.0, 2.0], 1).is_err());
    }
}

//! # recall-vector
//!
//! Namespaced vector store for the recall memory layer.
//!
//! Each namespace (`preferences:{user}`, `intent-cache:{scope}`) is an
//! independent partition with its own dimension, fixed by its first write.
//!
//! ## Features
//! - Exact (linear scan) or approximate (usearch HNSW) search
//! - Candidates re-ranked with exact cosine distance in both modes
//! - Durable records in RocksDB; indexes rebuilt lazily on first access
//! - TTL sweep helpers for expiring records

pub mod error;
pub mod hnsw;
pub mod index;
pub mod lifecycle;
pub mod store;

pub use error::VectorError;
pub use hnsw::{HnswConfig, HnswIndex};
pub use index::{FlatIndex, SearchResult, VectorIndex};
pub use lifecycle::{expiry_after, is_expired, set_expiry, sweep_expired, SweepStats};
pub use store::{LocalVectorStore, VectorStore};

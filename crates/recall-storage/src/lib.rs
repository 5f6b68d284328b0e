//! Storage layer for recall.
//!
//! Provides RocksDB-backed storage with:
//! - Column family isolation for records, namespaces, conversations,
//!   thread heads and the embedding cache
//! - Namespace-prefixed keys for efficient per-namespace scans
//! - Atomic conversation appends via WriteBatch
//! - Monotonic ULID record ids

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;

pub use db::{NamespaceMeta, Storage, StorageStats, ThreadHead};
pub use error::StorageError;
pub use keys::{validate_component, ConversationKey, RecordKey};

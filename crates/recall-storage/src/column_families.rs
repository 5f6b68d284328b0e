//! Column family definitions for RocksDB.
//!
//! Each column family isolates data with different access patterns:
//! - records: Vector store records keyed by namespace (default compaction)
//! - namespaces: Per-namespace metadata such as the vector dimension
//! - conversations: Append-only conversation entries (Zstd compressed)
//! - thread_heads: Per-thread sequence counters
//! - embedding_cache: Persistent tier of the embedding cache

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for vector store records
pub const CF_RECORDS: &str = "records";

/// Column family name for namespace metadata
pub const CF_NAMESPACES: &str = "namespaces";

/// Column family name for conversation entries
pub const CF_CONVERSATIONS: &str = "conversations";

/// Column family name for per-thread sequence heads
pub const CF_THREAD_HEADS: &str = "thread_heads";

/// Column family name for cached embeddings
pub const CF_EMBEDDING_CACHE: &str = "embedding_cache";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[
    CF_RECORDS,
    CF_NAMESPACES,
    CF_CONVERSATIONS,
    CF_THREAD_HEADS,
    CF_EMBEDDING_CACHE,
];

/// Conversation entries are append-only text; compress them.
fn conversations_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

/// Embedding vectors are incompressible floats; favour point lookups.
fn embedding_cache_options() -> Options {
    let mut opts = Options::default();
    opts.optimize_for_point_lookup(64);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_RECORDS, Options::default()),
        ColumnFamilyDescriptor::new(CF_NAMESPACES, Options::default()),
        ColumnFamilyDescriptor::new(CF_CONVERSATIONS, conversations_options()),
        ColumnFamilyDescriptor::new(CF_THREAD_HEADS, Options::default()),
        ColumnFamilyDescriptor::new(CF_EMBEDDING_CACHE, embedding_cache_options()),
    ]
}

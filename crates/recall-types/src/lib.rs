//! # recall-types
//!
//! Shared domain types for the recall memory layer.
//!
//! - Records: namespaced `(text, vector, metadata)` entries of the vector store
//! - Conversation entries: append-only per-thread history
//! - Cached decisions: payload of the semantic intent cache
//! - Seed data and settings
//!
//! ## Usage
//!
//! ```rust
//! use recall_types::{Namespace, Turn};
//!
//! let ns = Namespace::preferences("Mark").unwrap();
//! assert_eq!(ns.as_str(), "preferences:Mark");
//! let _turn = Turn::user("Find me a Knicks game");
//! ```

pub mod config;
pub mod conversation;
pub mod error;
pub mod intent;
pub mod record;
pub mod seed;

pub use config::{
    ConversationSettings, EmbeddingCacheSettings, EmbeddingProvider, EmbeddingSettings,
    IntentCacheSettings, PreferenceSettings, SchedulerSettings, SearchMode, Settings,
    VectorSettings,
};
pub use conversation::{Content, ConversationEntry, Role, ToolCall, Turn};
pub use error::MemoryError;
pub use intent::{CachedDecision, META_DECISION};
pub use record::{
    CacheHit, Metadata, MetadataValue, Namespace, Record, RecordId, RecordSource, GLOBAL_SCOPE,
    INTENT_CACHE_PREFIX, META_EXPIRES_AT, META_SOURCE, META_TIMESTAMP, META_USER,
    PREFERENCES_PREFIX, USER_SCOPE_PREFIX,
};
pub use seed::{SeedData, SeedInsight};

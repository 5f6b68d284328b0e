//! # recall-service
//!
//! The memory layer of the travel agent:
//! - `PreferenceMemory`: per-user preferences with semantic retrieval
//! - `ConversationLog`: append-only per-thread history with retention
//! - `SemanticIntentCache`: opt-in reuse of earlier agent decisions
//! - `MemoryContext`: all of the above built once from `Settings`
//! - `ToolRegistry`: the agent-facing preference tools
//!
//! Read paths degrade to empty results; write paths and dimension
//! mismatches surface as `ServiceError`.

pub mod context;
pub mod conversation;
mod embed;
pub mod error;
pub mod intent;
pub mod preferences;
pub mod tools;

pub use context::{MemoryContext, MemoryStats, TurnContext};
pub use conversation::{ConversationLog, ConversationStore, RetentionReport};
pub use error::ServiceError;
pub use intent::{
    Fingerprint, IntentCacheMetrics, IntentCacheMetricsSnapshot, SemanticIntentCache,
};
pub use preferences::{PreferenceMemory, ReseedReport};
pub use tools::{
    format_user_preferences, Tool, ToolError, ToolRegistry, ToolSpec, REMEMBER_PREFERENCE,
    SEARCH_PREFERENCES, USER_PREFERENCES,
};

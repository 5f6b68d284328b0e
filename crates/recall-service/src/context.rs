//! Memory context: every component of the memory layer, built once from
//! [`Settings`] and passed by reference.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use recall_embeddings::{build_provider, CacheStats, EmbeddingCache, EmbeddingModel};
use recall_storage::{Storage, StorageStats};
use recall_types::{CachedDecision, ConversationEntry, Settings, Turn};
use recall_vector::{LocalVectorStore, VectorStore};

use crate::conversation::ConversationLog;
use crate::error::ServiceError;
use crate::intent::{Fingerprint, IntentCacheMetricsSnapshot, SemanticIntentCache};
use crate::preferences::PreferenceMemory;
use crate::tools::ToolRegistry;

/// Everything the orchestrator needs to answer one user turn.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub user: String,
    pub thread_id: String,
    /// The stored user turn
    pub entry: ConversationEntry,
    /// Recent entries of the thread, the new turn included
    pub history: Vec<ConversationEntry>,
    /// Preferences relevant to the message
    pub preferences: Vec<String>,
    pub fingerprint: Fingerprint,
    /// Decision reused from the intent cache
    pub cached: Option<CachedDecision>,
}

impl TurnContext {
    /// Preferences rendered for injection into the model context.
    pub fn preference_context(&self) -> Option<String> {
        if self.preferences.is_empty() {
            return None;
        }
        let lines: Vec<String> = self.preferences.iter().map(|p| format!("- {p}")).collect();
        Some(format!(
            "Known preferences of {}:\n{}",
            self.user,
            lines.join("\n")
        ))
    }
}

/// Counters and sizes across the memory layer.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub storage: StorageStats,
    pub embedding_cache: CacheStats,
    pub intent_cache: IntentCacheMetricsSnapshot,
}

pub struct MemoryContext {
    settings: Settings,
    storage: Arc<Storage>,
    embeddings: Arc<EmbeddingCache>,
    vectors: Arc<LocalVectorStore>,
    preferences: Arc<PreferenceMemory>,
    conversations: Arc<ConversationLog>,
    intent_cache: Arc<SemanticIntentCache>,
}

impl MemoryContext {
    /// Open storage and build the configured embedding provider.
    pub fn open(settings: Settings) -> Result<Self, ServiceError> {
        settings.validate()?;
        let path = settings.expanded_db_path();
        let storage = Arc::new(Storage::open(&path)?);
        let provider = build_provider(&settings.embedding)?;
        info!(path = %path.display(), model = %provider.info().name, "Opened memory context");
        Self::with_provider(settings, storage, provider)
    }

    /// Build around an already opened store and provider.
    pub fn with_provider(
        settings: Settings,
        storage: Arc<Storage>,
        provider: Arc<dyn EmbeddingModel>,
    ) -> Result<Self, ServiceError> {
        let provider_dim = provider.info().dimension;
        if let Some(expected) = settings.embedding.dimension {
            if expected != provider_dim {
                return Err(ServiceError::Config(format!(
                    "embedding.dimension is {expected} but provider {} produces {provider_dim}",
                    provider.info().name
                )));
            }
        }

        let embeddings = Arc::new(EmbeddingCache::from_settings(
            provider,
            &settings.embedding_cache,
            Some(Arc::clone(&storage)),
        ));
        let vectors = Arc::new(match settings.embedding.dimension {
            Some(dimension) => LocalVectorStore::with_fixed_dimension(
                Arc::clone(&storage),
                settings.vector.clone(),
                dimension,
            ),
            None => LocalVectorStore::new(Arc::clone(&storage), settings.vector.clone()),
        });
        let store: Arc<dyn VectorStore> = vectors.clone();

        let intent_cache = Arc::new(SemanticIntentCache::new(
            embeddings.clone(),
            store.clone(),
            settings.intent_cache.clone(),
        ));
        let preferences = Arc::new(
            PreferenceMemory::new(
                embeddings.clone(),
                store,
                settings.preferences.clone(),
                settings.vector.max_distance,
            )
            .with_intent_cache(intent_cache.clone()),
        );
        let conversations = Arc::new(ConversationLog::new(
            storage.clone(),
            settings.conversation.clone(),
        ));

        Ok(Self {
            settings,
            storage,
            embeddings,
            vectors,
            preferences,
            conversations,
            intent_cache,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn embeddings(&self) -> &Arc<EmbeddingCache> {
        &self.embeddings
    }

    pub fn vectors(&self) -> &Arc<LocalVectorStore> {
        &self.vectors
    }

    pub fn preferences(&self) -> &Arc<PreferenceMemory> {
        &self.preferences
    }

    pub fn conversations(&self) -> &Arc<ConversationLog> {
        &self.conversations
    }

    pub fn intent_cache(&self) -> &Arc<SemanticIntentCache> {
        &self.intent_cache
    }

    /// Agent tools bound to this context's preference memory.
    pub fn tools(&self) -> ToolRegistry {
        ToolRegistry::with_memory_tools(
            Arc::clone(&self.preferences),
            self.settings.preferences.default_k,
        )
    }

    /// Record the user turn and gather its context.
    ///
    /// Fails only when the turn cannot be stored or on a dimension mismatch;
    /// every other lookup degrades to an empty result.
    pub async fn begin_turn(
        &self,
        user: &str,
        thread_id: &str,
        message: &str,
    ) -> Result<TurnContext, ServiceError> {
        let entry = self.conversations.append(thread_id, Turn::user(message)).await?;

        let history = match self
            .conversations
            .read(thread_id, Some(self.settings.conversation.history_limit))
            .await
        {
            Ok(history) => history,
            Err(e) => {
                warn!(thread_id, error = %e, "History unavailable, continuing with the current turn");
                vec![entry.clone()]
            }
        };

        let turns: Vec<Turn> = history.iter().map(ConversationEntry::to_turn).collect();
        let fingerprint = Fingerprint::from_turns(user, &turns, self.settings.intent_cache.window);
        let cached = self.intent_cache.lookup(&fingerprint).await?;

        let preferences = self
            .preferences
            .retrieve_relevant(user, message, self.settings.preferences.default_k)
            .await?;

        Ok(TurnContext {
            user: user.to_string(),
            thread_id: thread_id.to_string(),
            entry,
            history,
            preferences,
            fingerprint,
            cached,
        })
    }

    /// Store the agent's response and, when a fresh decision was made,
    /// remember it in the intent cache.
    pub async fn finish_turn(
        &self,
        turn: &TurnContext,
        response: Turn,
        decision: Option<&CachedDecision>,
    ) -> Result<ConversationEntry, ServiceError> {
        let entry = self.conversations.append(&turn.thread_id, response).await?;

        if let (Some(decision), None) = (decision, &turn.cached) {
            let ttl = Duration::from_secs(self.settings.intent_cache.ttl_secs);
            self.intent_cache
                .record(&turn.fingerprint, decision, Some(ttl))
                .await?;
        }
        Ok(entry)
    }

    pub async fn stats(&self) -> Result<MemoryStats, ServiceError> {
        let storage = Arc::clone(&self.storage);
        let storage_stats = tokio::task::spawn_blocking(move || storage.get_stats())
            .await
            .map_err(|e| ServiceError::PersistenceUnavailable(e.to_string()))??;
        Ok(MemoryStats {
            storage: storage_stats,
            embedding_cache: self.embeddings.stats(),
            intent_cache: self.intent_cache.metrics().snapshot(),
        })
    }

    /// Flush pending writes to disk.
    pub async fn flush(&self) -> Result<(), ServiceError> {
        let storage = Arc::clone(&self.storage);
        tokio::task::spawn_blocking(move || storage.flush())
            .await
            .map_err(|e| ServiceError::PersistenceUnavailable(e.to_string()))??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use recall_embeddings::MockEmbedder;
    use recall_types::{EmbeddingProvider, RecordSource, Role};
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> Settings {
        let mut settings = Settings::default();
        settings.db_path = dir.path().join("db").to_string_lossy().to_string();
        settings.embedding.provider = EmbeddingProvider::Mock;
        settings.embedding.dimension = Some(64);
        settings.intent_cache.enabled = true;
        settings
    }

    #[tokio::test]
    async fn test_open_with_mock_provider() {
        let dir = TempDir::new().unwrap();
        let ctx = MemoryContext::open(settings(&dir)).unwrap();
        assert_eq!(ctx.embeddings().info().dimension, 64);
        let stats = ctx.stats().await.unwrap();
        assert_eq!(stats.storage.record_count, 0);
    }

    #[tokio::test]
    async fn test_dimension_config_mismatch() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(dir.path()).unwrap());
        let result =
            MemoryContext::with_provider(settings(&dir), storage, Arc::new(MockEmbedder::new(32)));
        assert!(matches!(result, Err(ServiceError::Config(_))));
    }

    #[tokio::test]
    async fn test_turn_cycle() {
        let dir = TempDir::new().unwrap();
        let ctx = MemoryContext::open(settings(&dir)).unwrap();
        ctx.preferences()
            .learn("Mark", "Likes boutique hotels", RecordSource::Seed)
            .await
            .unwrap();

        let turn = ctx
            .begin_turn("Mark", "thread-1", "Likes boutique hotels")
            .await
            .unwrap();
        assert_eq!(turn.entry.sequence_index, 0);
        assert_eq!(turn.preferences, vec!["Likes boutique hotels".to_string()]);
        assert!(turn.cached.is_none());
        assert!(turn
            .preference_context()
            .unwrap()
            .contains("- Likes boutique hotels"));

        let decision = CachedDecision::response("Try the Ace Hotel");
        let reply = ctx
            .finish_turn(&turn, Turn::assistant("Try the Ace Hotel"), Some(&decision))
            .await
            .unwrap();
        assert_eq!(reply.sequence_index, 1);
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(ctx.intent_cache().entries("Mark").await.unwrap().len(), 1);
    }
}

//! Semantic intent cache.
//!
//! Maps a conversation fingerprint to a previously computed agent decision.
//! The cache is opt-in and never a hard dependency: when disabled, failing
//! or slow it answers like a miss. Only a dimension mismatch is surfaced.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, warn};

use recall_embeddings::EmbeddingModel;
use recall_types::{
    CachedDecision, IntentCacheSettings, Metadata, Namespace, Record, RecordId, Role, Turn,
    GLOBAL_SCOPE, INTENT_CACHE_PREFIX, META_DECISION,
};
use recall_vector::{expiry_after, set_expiry, sweep_expired, SweepStats, VectorStore};

use crate::embed::embed_within;
use crate::error::ServiceError;

/// Normalized text of the recent conversation, scoped to a user or, when
/// there is none, to the shared `global` scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    user: Option<String>,
    text: String,
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl Fingerprint {
    pub fn new(scope: &str, text: &str) -> Self {
        let scope = scope.trim();
        Self {
            user: (!scope.is_empty()).then(|| scope.to_string()),
            text: normalize(text),
        }
    }

    /// `role: text` lines of the last `window` user/assistant turns.
    pub fn from_turns(scope: &str, turns: &[Turn], window: usize) -> Self {
        let relevant: Vec<&Turn> = turns
            .iter()
            .filter(|t| matches!(t.role, Role::User | Role::Assistant))
            .filter(|t| !t.content.text.trim().is_empty())
            .collect();
        let start = relevant.len().saturating_sub(window);
        let text = relevant[start..]
            .iter()
            .map(|t| format!("{}: {}", t.role, normalize(&t.content.text)))
            .collect::<Vec<_>>()
            .join("\n");

        let mut fingerprint = Self::new(scope, "");
        fingerprint.text = text;
        fingerprint
    }

    pub fn scope(&self) -> &str {
        self.user.as_deref().unwrap_or(GLOBAL_SCOPE)
    }

    pub fn is_global(&self) -> bool {
        self.user.is_none()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn namespace(&self) -> Result<Namespace, ServiceError> {
        match &self.user {
            Some(user) => Ok(Namespace::user_intent_cache(user)?),
            None => Ok(Namespace::global_intent_cache()),
        }
    }
}

/// Counters for intent cache behavior.
#[derive(Debug, Default)]
pub struct IntentCacheMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub expired: AtomicU64,
    pub skipped_disabled: AtomicU64,
    pub errors: AtomicU64,
    pub recorded: AtomicU64,
}

impl IntentCacheMetrics {
    pub fn snapshot(&self) -> IntentCacheMetricsSnapshot {
        IntentCacheMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            skipped_disabled: self.skipped_disabled.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            recorded: self.recorded.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct IntentCacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub skipped_disabled: u64,
    pub errors: u64,
    pub recorded: u64,
}

pub struct SemanticIntentCache {
    embeddings: Arc<dyn EmbeddingModel>,
    store: Arc<dyn VectorStore>,
    settings: IntentCacheSettings,
    metrics: Arc<IntentCacheMetrics>,
}

impl SemanticIntentCache {
    pub fn new(
        embeddings: Arc<dyn EmbeddingModel>,
        store: Arc<dyn VectorStore>,
        settings: IntentCacheSettings,
    ) -> Self {
        Self {
            embeddings,
            store,
            settings,
            metrics: Arc::new(IntentCacheMetrics::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn settings(&self) -> &IntentCacheSettings {
        &self.settings
    }

    pub fn metrics(&self) -> Arc<IntentCacheMetrics> {
        Arc::clone(&self.metrics)
    }

    fn budget(&self) -> Duration {
        Duration::from_millis(self.settings.timeout_ms)
    }

    fn miss(&self) -> Result<Option<CachedDecision>, ServiceError> {
        self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    /// Cached decision for a fingerprint, if a live one is close enough.
    pub async fn lookup(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<CachedDecision>, ServiceError> {
        if !self.settings.enabled {
            self.metrics.skipped_disabled.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }
        if fingerprint.is_empty() {
            return self.miss();
        }

        match timeout(self.budget(), self.try_lookup(fingerprint)).await {
            Ok(Ok(Some(decision))) => {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                debug!(scope = fingerprint.scope(), "Intent cache hit");
                Ok(Some(decision))
            }
            Ok(Ok(None)) => self.miss(),
            Ok(Err(e)) if e.is_dimension_mismatch() => Err(e),
            Ok(Err(e)) => {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                warn!(scope = fingerprint.scope(), error = %e, "Intent cache lookup failed, treating as miss");
                self.miss()
            }
            Err(_) => {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                warn!(
                    scope = fingerprint.scope(),
                    timeout_ms = self.settings.timeout_ms,
                    "Intent cache lookup timed out, treating as miss"
                );
                self.miss()
            }
        }
    }

    async fn try_lookup(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<CachedDecision>, ServiceError> {
        let namespace = fingerprint.namespace()?;
        let vector = embed_within(self.embeddings.as_ref(), fingerprint.text(), self.budget()).await?;
        let hits = self
            .store
            .search(&namespace, &vector, 1, self.settings.max_distance)
            .await?;

        let hit = match hits.into_iter().next() {
            Some(hit) => hit,
            None => return Ok(None),
        };

        if hit.record.is_expired_at(Utc::now()) {
            self.metrics.expired.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = self.sweep_namespace(&namespace).await {
                warn!(namespace = %namespace, error = %e, "Lazy intent cache sweep failed");
            }
            return Ok(None);
        }

        let decision = hit
            .record
            .metadata
            .get(META_DECISION)
            .and_then(CachedDecision::from_metadata);
        if decision.is_none() {
            warn!(namespace = %namespace, id = %hit.record.id, "Intent cache record has no decision");
        }
        Ok(decision)
    }

    /// Store a decision for `fingerprint`, expiring after `ttl` (or the
    /// configured TTL). Returns `None` when nothing was stored.
    pub async fn record(
        &self,
        fingerprint: &Fingerprint,
        decision: &CachedDecision,
        ttl: Option<Duration>,
    ) -> Result<Option<RecordId>, ServiceError> {
        if !self.settings.enabled || fingerprint.is_empty() || decision.is_empty() {
            return Ok(None);
        }

        let ttl = self.resolve_ttl(ttl)?;
        match self.try_record(fingerprint, decision, ttl).await {
            Ok(id) => {
                self.metrics.recorded.fetch_add(1, Ordering::Relaxed);
                debug!(scope = fingerprint.scope(), id = %id, "Recorded intent decision");
                Ok(Some(id))
            }
            Err(e) if e.is_dimension_mismatch() => Err(e),
            Err(e) => {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                warn!(scope = fingerprint.scope(), error = %e, "Failed to record intent decision");
                Ok(None)
            }
        }
    }

    /// Caller TTL or the configured one, rejected when the expiry would
    /// not fit on the clock.
    fn resolve_ttl(&self, ttl: Option<Duration>) -> Result<chrono::Duration, ServiceError> {
        let ttl = ttl.unwrap_or(Duration::from_secs(self.settings.ttl_secs));
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| ServiceError::InvalidInput(format!("ttl out of range: {e}")))?;
        expiry_after(Utc::now(), ttl)?;
        Ok(ttl)
    }

    async fn try_record(
        &self,
        fingerprint: &Fingerprint,
        decision: &CachedDecision,
        ttl: chrono::Duration,
    ) -> Result<RecordId, ServiceError> {
        let namespace = fingerprint.namespace()?;
        let vector = embed_within(self.embeddings.as_ref(), fingerprint.text(), self.budget()).await?;

        let mut metadata = Metadata::new();
        metadata.insert(
            META_DECISION.to_string(),
            decision
                .to_metadata()
                .map_err(|e| ServiceError::InvalidInput(e.to_string()))?,
        );
        set_expiry(&mut metadata, Utc::now(), ttl)?;

        Ok(self
            .store
            .put(&namespace, fingerprint.text(), vector, metadata)
            .await?)
    }

    /// Delete every entry scoped to `user`.
    pub async fn invalidate_user(&self, user: &str) -> Result<usize, ServiceError> {
        let namespace = Namespace::user_intent_cache(user)?;
        let removed = self.store.delete(&namespace, &|_: &Record| true).await?;
        if removed > 0 {
            debug!(user, removed, "Invalidated intent cache scope");
        }
        Ok(removed)
    }

    /// Entries currently stored for `scope`; a blank scope lists the shared one.
    pub async fn entries(&self, scope: &str) -> Result<Vec<Record>, ServiceError> {
        let namespace = Fingerprint::new(scope, "").namespace()?;
        Ok(self.store.list(&namespace).await?)
    }

    async fn sweep_namespace(&self, namespace: &Namespace) -> Result<usize, ServiceError> {
        let now = Utc::now();
        Ok(self
            .store
            .delete(namespace, &move |record: &Record| record.is_expired_at(now))
            .await?)
    }

    /// Delete expired entries across all scopes.
    pub async fn sweep_expired(&self) -> Result<SweepStats, ServiceError> {
        Ok(sweep_expired(self.store.as_ref(), INTENT_CACHE_PREFIX, Utc::now()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use recall_embeddings::MockEmbedder;
    use recall_storage::Storage;
    use recall_types::VectorSettings;
    use recall_vector::LocalVectorStore;
    use tempfile::TempDir;

    fn enabled() -> IntentCacheSettings {
        IntentCacheSettings {
            enabled: true,
            ..Default::default()
        }
    }

    fn cache(settings: IntentCacheSettings) -> (TempDir, Arc<MockEmbedder>, SemanticIntentCache) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(dir.path()).unwrap());
        let store = Arc::new(LocalVectorStore::new(storage, VectorSettings::default()));
        let embedder = Arc::new(MockEmbedder::new(64));
        let cache = SemanticIntentCache::new(embedder.clone(), store, settings);
        (dir, embedder, cache)
    }

    #[test]
    fn test_fingerprint_from_turns() {
        let turns = vec![
            Turn::system("You are a travel agent"),
            Turn::user("Hi"),
            Turn::assistant("Hello!   How can I help?"),
            Turn::user("Find me a  KNICKS game"),
        ];
        let fp = Fingerprint::from_turns("Mark", &turns, 2);
        assert_eq!(fp.scope(), "Mark");
        assert_eq!(
            fp.text(),
            "assistant: hello! how can i help?\nuser: find me a knicks game"
        );

        let global = Fingerprint::from_turns("  ", &turns, 10);
        assert_eq!(global.scope(), GLOBAL_SCOPE);
        assert!(global.is_global());
        assert!(global.text().starts_with("user: hi\n"));
    }

    #[tokio::test]
    async fn test_user_named_global_has_own_scope() {
        let (_dir, _embedder, cache) = cache(enabled());
        let decision = CachedDecision::response("Searching hotels");
        let shared = Fingerprint::new("", "user: hotel in paris");
        let user = Fingerprint::new("global", "user: hotel in paris");
        assert!(!user.is_global());
        assert_ne!(shared.namespace().unwrap(), user.namespace().unwrap());

        cache.record(&shared, &decision, None).await.unwrap();
        cache.record(&user, &decision, None).await.unwrap();

        assert_eq!(cache.invalidate_user("global").await.unwrap(), 1);
        assert_eq!(cache.entries("").await.unwrap().len(), 1);
        assert_eq!(cache.lookup(&shared).await.unwrap(), Some(decision));
        assert_eq!(cache.lookup(&user).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_is_rejected() {
        let (_dir, _embedder, cache) = cache(enabled());
        let fp = Fingerprint::new("Mark", "user: hotel in paris");
        let decision = CachedDecision::response("Searching hotels");

        let err = cache
            .record(&fp, &decision, Some(Duration::from_secs(10_000_000_000_000)))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        assert!(cache.entries("Mark").await.unwrap().is_empty());
        assert!(cache.record(&fp, &decision, None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_record_then_lookup() {
        let (_dir, _embedder, cache) = cache(enabled());
        let fp = Fingerprint::new("Mark", "user: find me a knicks game");
        let decision = CachedDecision::tool("search_events", serde_json::json!({"team": "Knicks"}));

        assert_eq!(cache.lookup(&fp).await.unwrap(), None);
        assert!(cache.record(&fp, &decision, None).await.unwrap().is_some());
        assert_eq!(cache.lookup(&fp).await.unwrap(), Some(decision));

        let other_user = Fingerprint::new("Shay", "user: find me a knicks game");
        assert_eq!(cache.lookup(&other_user).await.unwrap(), None);

        let snapshot = cache.metrics().snapshot();
        assert_eq!(snapshot.hits, 1);
        assert_eq!(snapshot.misses, 2);
        assert_eq!(snapshot.recorded, 1);
    }

    #[tokio::test]
    async fn test_disabled_behaves_like_miss() {
        let (_dir, embedder, cache) = cache(IntentCacheSettings::default());
        let fp = Fingerprint::new("Mark", "user: hello");
        let decision = CachedDecision::response("hi");

        assert_eq!(cache.record(&fp, &decision, None).await.unwrap(), None);
        assert_eq!(cache.lookup(&fp).await.unwrap(), None);
        assert_eq!(embedder.call_count(), 0);
        assert_eq!(cache.metrics().snapshot().skipped_disabled, 1);
    }

    #[tokio::test]
    async fn test_expired_hit_is_miss_and_swept() {
        let (_dir, _embedder, cache) = cache(enabled());
        let fp = Fingerprint::new("Mark", "user: weather in paris");
        let decision = CachedDecision::response("sunny");

        cache.record(&fp, &decision, Some(Duration::from_millis(1))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(cache.lookup(&fp).await.unwrap(), None);
        assert!(cache.entries("Mark").await.unwrap().is_empty());
        assert_eq!(cache.metrics().snapshot().expired, 1);
    }

    #[tokio::test]
    async fn test_failing_embedder_is_miss() {
        let (_dir, embedder, cache) = cache(enabled());
        embedder.set_failing(true);
        let fp = Fingerprint::new("Mark", "user: hello");

        assert_eq!(cache.lookup(&fp).await.unwrap(), None);
        assert_eq!(
            cache.record(&fp, &CachedDecision::response("x"), None).await.unwrap(),
            None
        );
        assert_eq!(cache.metrics().snapshot().errors, 2);
    }

    #[tokio::test]
    async fn test_invalidate_user_and_sweep() {
        let (_dir, _embedder, cache) = cache(enabled());
        for text in ["user: a", "user: b"] {
            cache
                .record(&Fingerprint::new("Mark", text), &CachedDecision::response("ok"), None)
                .await
                .unwrap();
        }
        cache
            .record(
                &Fingerprint::new("Shay", "user: c"),
                &CachedDecision::response("ok"),
                Some(Duration::from_millis(1)),
            )
            .await
            .unwrap();

        assert_eq!(cache.invalidate_user("Mark").await.unwrap(), 2);
        assert!(cache.entries("Mark").await.unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let stats = cache.sweep_expired().await.unwrap();
        assert_eq!(stats.records_removed, 1);
    }
}

//! Per-user preference memory.
//!
//! Each user owns the `preferences:{user}` namespace. Reads degrade to an
//! empty result on any failure except a dimension mismatch; writes surface
//! their errors.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use recall_embeddings::EmbeddingModel;
use recall_types::{
    Metadata, MetadataValue, Namespace, Record, RecordId, RecordSource, SeedData,
    PreferenceSettings, META_SOURCE, META_TIMESTAMP, META_USER, PREFERENCES_PREFIX,
};
use recall_vector::VectorStore;

use crate::embed::embed_within;
use crate::error::ServiceError;
use crate::intent::SemanticIntentCache;

/// Outcome of a reseed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReseedReport {
    pub users: usize,
    pub deleted: usize,
    pub inserted: usize,
}

pub struct PreferenceMemory {
    embeddings: Arc<dyn EmbeddingModel>,
    store: Arc<dyn VectorStore>,
    intent_cache: Option<Arc<SemanticIntentCache>>,
    settings: PreferenceSettings,
    max_distance: f32,
}

impl PreferenceMemory {
    pub fn new(
        embeddings: Arc<dyn EmbeddingModel>,
        store: Arc<dyn VectorStore>,
        settings: PreferenceSettings,
        max_distance: f32,
    ) -> Self {
        Self {
            embeddings,
            store,
            intent_cache: None,
            settings,
            max_distance,
        }
    }

    /// Invalidate this cache's user scope after every learn.
    pub fn with_intent_cache(mut self, cache: Arc<SemanticIntentCache>) -> Self {
        self.intent_cache = Some(cache);
        self
    }

    pub fn settings(&self) -> &PreferenceSettings {
        &self.settings
    }

    fn read_budget(&self) -> Duration {
        Duration::from_millis(self.settings.read_timeout_ms)
    }

    fn write_budget(&self) -> Duration {
        Duration::from_millis(self.settings.write_timeout_ms)
    }

    /// Store a preference for `user`. No de-duplication.
    pub async fn learn(
        &self,
        user: &str,
        text: &str,
        source: RecordSource,
    ) -> Result<RecordId, ServiceError> {
        let text = preference_text(text)?;
        let namespace = Namespace::preferences(user)?;
        let vector = embed_within(self.embeddings.as_ref(), text, self.write_budget()).await?;
        self.store_embedded(user, &namespace, text, vector, source).await
    }

    async fn store_embedded(
        &self,
        user: &str,
        namespace: &Namespace,
        text: &str,
        vector: Vec<f32>,
        source: RecordSource,
    ) -> Result<RecordId, ServiceError> {
        let mut metadata = Metadata::new();
        metadata.insert(META_USER.to_string(), MetadataValue::from(user));
        metadata.insert(META_SOURCE.to_string(), MetadataValue::from(source.as_str()));
        metadata.insert(
            META_TIMESTAMP.to_string(),
            MetadataValue::Int(Utc::now().timestamp_millis()),
        );

        let id = match timeout(
            self.write_budget(),
            self.store.put(namespace, text, vector, metadata),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(ServiceError::IndexUnavailable(format!(
                    "put timed out after {}ms",
                    self.settings.write_timeout_ms
                )))
            }
        };
        debug!(user, id = %id, source = %source, "Learned preference");

        if let Some(cache) = &self.intent_cache {
            if let Err(e) = cache.invalidate_user(user).await {
                warn!(user, error = %e, "Intent cache invalidation failed; entries expire by TTL");
            }
        }
        Ok(id)
    }

    async fn records(&self, user: &str) -> Result<Vec<Record>, ServiceError> {
        let namespace = Namespace::preferences(user)?;
        match timeout(self.read_budget(), self.store.list(&namespace)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ServiceError::IndexUnavailable(format!(
                "list timed out after {}ms",
                self.settings.read_timeout_ms
            ))),
        }
    }

    /// Every preference of `user`, in insertion order.
    pub async fn retrieve_all(&self, user: &str) -> Vec<String> {
        match self.records(user).await {
            Ok(records) => records.into_iter().map(|r| r.text).collect(),
            Err(e) => {
                warn!(user, error = %e, "Failed to list preferences, returning none");
                Vec::new()
            }
        }
    }

    /// Up to `k` preferences of `user` semantically close to `query`.
    pub async fn retrieve_relevant(
        &self,
        user: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<String>, ServiceError> {
        if k == 0 || query.trim().is_empty() || user.trim().is_empty() {
            return Ok(Vec::new());
        }

        match timeout(self.read_budget(), self.try_retrieve(user, query, k)).await {
            Ok(Ok(texts)) => Ok(texts),
            Ok(Err(e)) if e.is_dimension_mismatch() => Err(e),
            Ok(Err(e)) => {
                warn!(user, error = %e, "Preference retrieval degraded to empty");
                Ok(Vec::new())
            }
            Err(_) => {
                warn!(
                    user,
                    timeout_ms = self.settings.read_timeout_ms,
                    "Preference retrieval timed out, returning none"
                );
                Ok(Vec::new())
            }
        }
    }

    async fn try_retrieve(&self, user: &str, query: &str, k: usize) -> Result<Vec<String>, ServiceError> {
        let namespace = Namespace::preferences(user)?;
        if self.store.dimension(&namespace).await?.is_none() {
            return Ok(Vec::new());
        }
        let vector = embed_within(self.embeddings.as_ref(), query, self.read_budget()).await?;
        let hits = self
            .store
            .search(&namespace, &vector, k, self.max_distance)
            .await?;
        Ok(hits.into_iter().map(|hit| hit.record.text).collect())
    }

    /// Delete all preferences of `user`.
    pub async fn clear(&self, user: &str) -> Result<usize, ServiceError> {
        let namespace = Namespace::preferences(user)?;
        let removed = self.store.delete(&namespace, &|_: &Record| true).await?;
        info!(user, removed, "Cleared preferences");
        Ok(removed)
    }

    /// Users with a preference namespace.
    pub async fn users(&self) -> Result<Vec<String>, ServiceError> {
        Ok(self
            .store
            .namespaces(PREFERENCES_PREFIX)
            .await?
            .iter()
            .filter_map(|ns| ns.suffix_after(PREFERENCES_PREFIX).map(str::to_string))
            .collect())
    }

    /// Whether any user holds learned (non-seed) preferences.
    pub async fn has_learned(&self) -> Result<bool, ServiceError> {
        for user in self.users().await? {
            let learned = self
                .records(&user)
                .await?
                .iter()
                .any(|r| r.source() == Some(RecordSource::Learned));
            if learned {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Replace the preferences of every seeded user with the seed entries.
    /// A user's profile is only cleared once all of their insights embedded.
    pub async fn reseed(&self, seed: &SeedData) -> Result<ReseedReport, ServiceError> {
        let mut report = ReseedReport::default();
        for user in seed.users() {
            let namespace = Namespace::preferences(user)?;
            let mut embedded = Vec::new();
            for insight in seed.insights_for(user) {
                let text = preference_text(insight)?;
                let vector = embed_within(self.embeddings.as_ref(), text, self.write_budget()).await?;
                embedded.push((text, vector));
            }

            report.deleted += self.clear(user).await?;
            for (text, vector) in embedded {
                self.store_embedded(user, &namespace, text, vector, RecordSource::Seed)
                    .await?;
                report.inserted += 1;
            }
            report.users += 1;
        }
        info!(
            users = report.users,
            deleted = report.deleted,
            inserted = report.inserted,
            "Reseeded preferences"
        );
        Ok(report)
    }
}

fn preference_text(text: &str) -> Result<&str, ServiceError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ServiceError::InvalidInput("preference text must not be empty".to_string()));
    }
    Ok(text)
}

//! Graceful degradation: reads fall back to empty, writes and dimension
//! mismatches surface, nothing panics.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;

use e2e_tests::{
    FailingConversationStore, FailingVectorStore, HangingVectorStore, TestHarness, TEST_DIMENSION,
};
use recall_embeddings::MockEmbedder;
use recall_service::{
    ConversationLog, Fingerprint, PreferenceMemory, SemanticIntentCache, ServiceError,
};
use recall_types::{
    CachedDecision, ConversationSettings, IntentCacheSettings, PreferenceSettings, RecordSource,
    Turn,
};
use recall_vector::VectorStore;

fn memory_over(store: Arc<dyn VectorStore>) -> PreferenceMemory {
    PreferenceMemory::new(
        Arc::new(MockEmbedder::new(TEST_DIMENSION)),
        store,
        PreferenceSettings {
            read_timeout_ms: 100,
            write_timeout_ms: 100,
            ..Default::default()
        },
        0.15,
    )
}

fn cache_over(store: Arc<dyn VectorStore>) -> SemanticIntentCache {
    SemanticIntentCache::new(
        Arc::new(MockEmbedder::new(TEST_DIMENSION)),
        store,
        IntentCacheSettings {
            enabled: true,
            timeout_ms: 100,
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn test_index_down_reads_empty_writes_fail() {
    let memory = memory_over(Arc::new(FailingVectorStore));

    assert!(memory
        .retrieve_relevant("Mark", "hotels", 3)
        .await
        .unwrap()
        .is_empty());
    assert!(memory.retrieve_all("Mark").await.is_empty());

    let err = memory
        .learn("Mark", "Aisle seat", RecordSource::Learned)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::IndexUnavailable(_)));
}

#[tokio::test]
async fn test_slow_index_is_bounded() {
    let store = Arc::new(HangingVectorStore {
        delay: Duration::from_secs(5),
    });
    let memory = memory_over(store.clone());
    let cache = cache_over(store);

    let started = Instant::now();
    assert!(memory
        .retrieve_relevant("Mark", "hotels", 3)
        .await
        .unwrap()
        .is_empty());
    assert!(cache
        .lookup(&Fingerprint::new("Mark", "hotel in paris"))
        .await
        .unwrap()
        .is_none());
    assert!(matches!(
        memory.learn("Mark", "Aisle seat", RecordSource::Learned).await,
        Err(ServiceError::IndexUnavailable(_))
    ));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_intent_cache_failures_are_misses() {
    let cache = cache_over(Arc::new(FailingVectorStore));
    let fp = Fingerprint::new("Mark", "flights to lisbon");

    assert_eq!(cache.lookup(&fp).await.unwrap(), None);
    assert_eq!(
        cache
            .record(&fp, &CachedDecision::response("ok"), None)
            .await
            .unwrap(),
        None
    );
    let metrics = cache.metrics().snapshot();
    assert_eq!(metrics.errors, 2);
    assert_eq!(metrics.misses, 1);
}

#[tokio::test]
async fn test_embedding_outage() {
    let harness = TestHarness::new();
    let prefs = harness.ctx.preferences();
    prefs
        .learn("Mark", "Likes boutique hotels", RecordSource::Seed)
        .await
        .unwrap();

    harness.embedder.set_failing(true);

    // a query never embedded before cannot be served from the cache
    assert!(prefs
        .retrieve_relevant("Mark", "quiet rooms", 3)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(prefs.retrieve_all("Mark").await, vec!["Likes boutique hotels"]);

    let err = prefs
        .learn("Mark", "Early check-in", RecordSource::Learned)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::EmbeddingUnavailable(_)));

    let turn = harness
        .ctx
        .begin_turn("Mark", "t", "something brand new")
        .await
        .unwrap();
    assert!(turn.preferences.is_empty());
    assert!(turn.cached.is_none());
}

#[tokio::test]
async fn test_dimension_mismatch_surfaces() {
    let harness = TestHarness::new();
    harness
        .ctx
        .preferences()
        .learn("Mark", "Aisle seat", RecordSource::Seed)
        .await
        .unwrap();

    let narrow = PreferenceMemory::new(
        Arc::new(MockEmbedder::new(TEST_DIMENSION / 2)),
        harness.ctx.vectors().clone(),
        PreferenceSettings::default(),
        0.15,
    );
    let err = narrow
        .retrieve_relevant("Mark", "Aisle seat", 3)
        .await
        .unwrap_err();
    assert!(err.is_dimension_mismatch());

    let err = narrow
        .learn("Mark", "Window seat", RecordSource::Learned)
        .await
        .unwrap_err();
    assert!(err.is_dimension_mismatch());
    assert_eq!(harness.ctx.preferences().retrieve_all("Mark").await.len(), 1);
}

#[tokio::test]
async fn test_conversation_store_down() {
    let log = ConversationLog::new(
        Arc::new(FailingConversationStore),
        ConversationSettings::default(),
    );

    assert!(matches!(
        log.append("t", Turn::user("hello")).await,
        Err(ServiceError::PersistenceUnavailable(_))
    ));
    assert!(matches!(
        log.read("t", None).await,
        Err(ServiceError::PersistenceUnavailable(_))
    ));
    assert!(matches!(
        log.enforce_retention().await,
        Err(ServiceError::PersistenceUnavailable(_))
    ));
}

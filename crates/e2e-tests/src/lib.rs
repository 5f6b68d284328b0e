//! End-to-end test infrastructure for recall.
//!
//! Provides a shared TestHarness over a real RocksDB directory and a mock
//! embedder, plus stores that fail on purpose for degradation scenarios.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use recall_embeddings::MockEmbedder;
use recall_service::{ConversationStore, MemoryContext};
use recall_storage::{Storage, StorageError};
use recall_types::{
    CacheHit, ConversationEntry, EmbeddingProvider, Metadata, Namespace, Record, RecordId,
    Settings, Turn,
};
use recall_vector::{VectorError, VectorStore};

/// Dimension every harness embedder produces.
pub const TEST_DIMENSION: usize = 64;

/// Shared test harness for E2E tests.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub storage: Arc<Storage>,
    /// Provider behind the context's embedding cache
    pub embedder: Arc<MockEmbedder>,
    pub ctx: MemoryContext,
}

impl TestHarness {
    /// Harness with the intent cache enabled.
    pub fn new() -> Self {
        Self::with_settings(|_| {})
    }

    /// Harness whose settings are adjusted by `configure` before opening.
    pub fn with_settings(configure: impl FnOnce(&mut Settings)) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let storage =
            Arc::new(Storage::open(temp_dir.path()).expect("Failed to open test storage"));
        let embedder = Arc::new(MockEmbedder::new(TEST_DIMENSION));

        let mut settings = test_settings(temp_dir.path());
        configure(&mut settings);

        let ctx = MemoryContext::with_provider(settings, storage.clone(), embedder.clone())
            .expect("Failed to build memory context");

        Self {
            _temp_dir: temp_dir,
            storage,
            embedder,
            ctx,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings for a mock provider rooted at `dir`, intent cache on.
pub fn test_settings(dir: &std::path::Path) -> Settings {
    let mut settings = Settings::default();
    settings.db_path = dir.to_string_lossy().to_string();
    settings.embedding.provider = EmbeddingProvider::Mock;
    settings.embedding.dimension = Some(TEST_DIMENSION);
    settings.intent_cache.enabled = true;
    settings
}

/// Unit vector along `axis`.
pub fn axis_vector(dimension: usize, axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; dimension];
    v[axis % dimension] = 1.0;
    v
}

/// Unit vector at `angle` radians from axis 0 towards axis 1.
pub fn angled_vector(dimension: usize, angle: f32) -> Vec<f32> {
    let mut v = vec![0.0; dimension];
    v[0] = angle.cos();
    v[1] = angle.sin();
    v
}

/// Random vector with components in [-1, 1).
pub fn random_vector(dimension: usize) -> Vec<f32> {
    let mut rng = rand::rng();
    (0..dimension).map(|_| rng.random_range(-1.0..1.0)).collect()
}

/// Vector store that refuses every call.
pub struct FailingVectorStore;

fn refused() -> VectorError {
    VectorError::IndexUnavailable("test store is down".to_string())
}

#[async_trait]
impl VectorStore for FailingVectorStore {
    async fn put(
        &self,
        _namespace: &Namespace,
        _text: &str,
        _vector: Vec<f32>,
        _metadata: Metadata,
    ) -> Result<RecordId, VectorError> {
        Err(refused())
    }

    async fn search(
        &self,
        _namespace: &Namespace,
        _query: &[f32],
        _k: usize,
        _max_distance: f32,
    ) -> Result<Vec<CacheHit>, VectorError> {
        Err(refused())
    }

    async fn delete(
        &self,
        _namespace: &Namespace,
        _predicate: &(dyn Fn(&Record) -> bool + Send + Sync),
    ) -> Result<usize, VectorError> {
        Err(refused())
    }

    async fn list(&self, _namespace: &Namespace) -> Result<Vec<Record>, VectorError> {
        Err(refused())
    }

    async fn namespaces(&self, _prefix: &str) -> Result<Vec<Namespace>, VectorError> {
        Err(refused())
    }

    async fn dimension(&self, _namespace: &Namespace) -> Result<Option<usize>, VectorError> {
        Err(refused())
    }
}

/// Vector store whose calls never complete within any sane budget.
pub struct HangingVectorStore {
    pub delay: Duration,
}

#[async_trait]
impl VectorStore for HangingVectorStore {
    async fn put(
        &self,
        _namespace: &Namespace,
        _text: &str,
        _vector: Vec<f32>,
        _metadata: Metadata,
    ) -> Result<RecordId, VectorError> {
        tokio::time::sleep(self.delay).await;
        Err(refused())
    }

    async fn search(
        &self,
        _namespace: &Namespace,
        _query: &[f32],
        _k: usize,
        _max_distance: f32,
    ) -> Result<Vec<CacheHit>, VectorError> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }

    async fn delete(
        &self,
        _namespace: &Namespace,
        _predicate: &(dyn Fn(&Record) -> bool + Send + Sync),
    ) -> Result<usize, VectorError> {
        tokio::time::sleep(self.delay).await;
        Ok(0)
    }

    async fn list(&self, _namespace: &Namespace) -> Result<Vec<Record>, VectorError> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }

    async fn namespaces(&self, _prefix: &str) -> Result<Vec<Namespace>, VectorError> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }

    async fn dimension(&self, _namespace: &Namespace) -> Result<Option<usize>, VectorError> {
        tokio::time::sleep(self.delay).await;
        Ok(Some(TEST_DIMENSION))
    }
}

/// Conversation store whose disk is gone.
pub struct FailingConversationStore;

fn disk_gone() -> StorageError {
    StorageError::ColumnFamilyNotFound("conversations".to_string())
}

impl ConversationStore for FailingConversationStore {
    fn append(&self, _thread_id: &str, _turn: Turn) -> Result<ConversationEntry, StorageError> {
        Err(disk_gone())
    }

    fn read(
        &self,
        _thread_id: &str,
        _limit: Option<usize>,
    ) -> Result<Vec<ConversationEntry>, StorageError> {
        Err(disk_gone())
    }

    fn trim(&self, _thread_id: &str, _max_entries: usize) -> Result<usize, StorageError> {
        Err(disk_gone())
    }

    fn threads(&self) -> Result<Vec<String>, StorageError> {
        Err(disk_gone())
    }
}

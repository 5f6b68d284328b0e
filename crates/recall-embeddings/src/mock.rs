//! Deterministic offline embedder for tests and demos.
//!
//! Known texts map to fixture vectors; anything else is embedded as a
//! signed hashed bag of words, so texts sharing words land close together.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::error::EmbeddingError;
use crate::model::{Embedding, EmbeddingModel, ModelInfo};

/// Dimension used when none is configured.
pub const DEFAULT_MOCK_DIMENSION: usize = 256;

/// Mock embedding provider.
pub struct MockEmbedder {
    info: ModelInfo,
    fixtures: RwLock<HashMap<String, Vec<f32>>>,
    failing: AtomicBool,
    delay: RwLock<Option<Duration>>,
    calls: AtomicU64,
}

fn fixture_key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            info: ModelInfo {
                name: "mock-embedding".to_string(),
                dimension,
            },
            fixtures: RwLock::new(HashMap::new()),
            failing: AtomicBool::new(false),
            delay: RwLock::new(None),
            calls: AtomicU64::new(0),
        }
    }

    /// Pin `text` (case and whitespace insensitive) to `vector`.
    pub fn with_fixture(self, text: &str, vector: Vec<f32>) -> Self {
        self.add_fixture(text, vector);
        self
    }

    pub fn add_fixture(&self, text: &str, vector: Vec<f32>) {
        self.fixtures.write().insert(fixture_key(text), vector);
    }

    /// Make every subsequent call fail with `Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Sleep before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write() = delay;
    }

    /// Number of embed calls received, including failed ones.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn hashed_bag_of_words(&self, text: &str) -> Vec<f32> {
        let dim = self.info.dimension;
        let mut values = vec![0.0f32; dim];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = blake3::hash(token.as_bytes());
            let bytes = digest.as_bytes();
            let mut slot = [0u8; 8];
            slot.copy_from_slice(&bytes[..8]);
            let index = (u64::from_le_bytes(slot) % dim as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            values[index] += sign;
        }
        values
    }
}

#[async_trait]
impl EmbeddingModel for MockEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Unavailable("mock embedder set to fail".to_string()));
        }
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("text must not be empty".to_string()));
        }

        let fixture = self.fixtures.read().get(&fixture_key(text)).cloned();
        let values = match fixture {
            Some(values) => values,
            None => self.hashed_bag_of_words(text),
        };
        Ok(Embedding::new(values))
    }
}

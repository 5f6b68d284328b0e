//! # recall-embeddings
//!
//! Text embedding for the recall memory layer.
//!
//! ## Features
//! - `EmbeddingModel` async provider trait
//! - OpenAI-compatible and Azure OpenAI HTTP embedder with retries
//! - Deterministic mock embedder for tests and offline use
//! - Two-tier `EmbeddingCache` (LRU + persistent) that is itself a provider

pub mod api;
pub mod cache;
pub mod error;
pub mod mock;
pub mod model;

use std::sync::Arc;

use recall_types::{EmbeddingProvider, EmbeddingSettings};

pub use api::{ApiEmbedder, ApiEmbedderConfig, ApiFlavor, DEFAULT_API_DIMENSION};
pub use cache::{cache_key, CacheStats, EmbeddingCache};
pub use error::EmbeddingError;
pub use mock::{MockEmbedder, DEFAULT_MOCK_DIMENSION};
pub use model::{cosine_distance, cosine_similarity, Embedding, EmbeddingModel, ModelInfo};

/// Build the configured provider.
pub fn build_provider(
    settings: &EmbeddingSettings,
) -> Result<Arc<dyn EmbeddingModel>, EmbeddingError> {
    match settings.provider {
        EmbeddingProvider::Mock => Ok(Arc::new(MockEmbedder::new(
            settings.dimension.unwrap_or(DEFAULT_MOCK_DIMENSION),
        ))),
        EmbeddingProvider::Openai | EmbeddingProvider::Azure => {
            let config = ApiEmbedderConfig::from_settings(settings)?;
            Ok(Arc::new(ApiEmbedder::new(config)?))
        }
    }
}

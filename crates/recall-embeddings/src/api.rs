//! HTTP embedder for OpenAI-compatible and Azure OpenAI endpoints.

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

use recall_types::{EmbeddingProvider, EmbeddingSettings};

use crate::error::EmbeddingError;
use crate::model::{Embedding, EmbeddingModel, ModelInfo};

/// Dimension of `text-embedding-3-small` when none is configured.
pub const DEFAULT_API_DIMENSION: usize = 1536;

/// Endpoint flavour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiFlavor {
    /// `POST {base_url}/embeddings` with a bearer token
    OpenAi,
    /// `POST {endpoint}/openai/deployments/{deployment}/embeddings?api-version=...`
    /// with an `api-key` header
    Azure {
        deployment: String,
        api_version: String,
    },
}

/// Configuration for the HTTP embedder.
#[derive(Debug, Clone)]
pub struct ApiEmbedderConfig {
    pub flavor: ApiFlavor,

    /// API base URL (e.g., "https://api.openai.com/v1")
    pub base_url: String,

    /// Model name sent in the request and used as the cache namespace
    pub model: String,

    pub api_key: SecretString,

    /// Requested output dimension; sent as `dimensions` when set
    pub dimension: Option<usize>,

    /// Request timeout
    pub timeout: Duration,

    /// Retries after the first attempt on transient failures
    pub max_retries: u32,
}

impl ApiEmbedderConfig {
    /// Create config for the OpenAI API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            flavor: ApiFlavor::OpenAi,
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.into(),
            api_key: SecretString::from(api_key.into()),
            dimension: None,
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }

    /// Create config for an Azure OpenAI deployment.
    pub fn azure(
        endpoint: impl Into<String>,
        deployment: impl Into<String>,
        api_version: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let deployment = deployment.into();
        Self {
            flavor: ApiFlavor::Azure {
                deployment: deployment.clone(),
                api_version: api_version.into(),
            },
            base_url: endpoint.into(),
            model: deployment,
            api_key: SecretString::from(api_key.into()),
            dimension: None,
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }

    /// Build from settings. Fails when no API key can be found.
    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self, EmbeddingError> {
        let api_key = settings.resolved_api_key().ok_or_else(|| {
            EmbeddingError::Config(format!(
                "no API key configured (set embedding.api_key or {})",
                settings.api_key_env
            ))
        })?;

        let mut config = match settings.provider {
            EmbeddingProvider::Openai => {
                let mut config = Self::openai(api_key, settings.model.clone());
                if let Some(base_url) = &settings.base_url {
                    config.base_url = base_url.clone();
                }
                config
            }
            EmbeddingProvider::Azure => {
                let endpoint = settings.base_url.clone().ok_or_else(|| {
                    EmbeddingError::Config("azure provider requires embedding.base_url".to_string())
                })?;
                let deployment = settings
                    .deployment
                    .clone()
                    .unwrap_or_else(|| settings.model.clone());
                let mut config =
                    Self::azure(endpoint, deployment, settings.api_version.clone(), api_key);
                config.model = settings.model.clone();
                config
            }
            EmbeddingProvider::Mock => {
                return Err(EmbeddingError::Config(
                    "mock provider has no HTTP configuration".to_string(),
                ))
            }
        };
        config.dimension = settings.dimension;
        config.timeout = Duration::from_millis(settings.timeout_ms);
        config.max_retries = settings.max_retries;
        Ok(config)
    }

    fn url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        match &self.flavor {
            ApiFlavor::OpenAi => format!("{}/embeddings", base),
            ApiFlavor::Azure {
                deployment,
                api_version,
            } => format!(
                "{}/openai/deployments/{}/embeddings?api-version={}",
                base, deployment, api_version
            ),
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [&'a str],
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// HTTP embedding provider.
pub struct ApiEmbedder {
    client: Client,
    config: ApiEmbedderConfig,
    info: ModelInfo,
}

impl ApiEmbedder {
    pub fn new(config: ApiEmbedderConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EmbeddingError::Config(e.to_string()))?;

        let info = ModelInfo {
            name: config.model.clone(),
            dimension: config.dimension.unwrap_or(DEFAULT_API_DIMENSION),
        };
        Ok(Self {
            client,
            config,
            info,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.flavor {
            ApiFlavor::OpenAi => request.header(
                "Authorization",
                format!("Bearer {}", self.config.api_key.expose_secret()),
            ),
            ApiFlavor::Azure { .. } => {
                request.header("api-key", self.config.api_key.expose_secret())
            }
        }
    }

    /// Call the API with retry logic.
    async fn call_api(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut backoff = ExponentialBackoff {
            current_interval: Duration::from_millis(200),
            initial_interval: Duration::from_millis(200),
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(attempt = attempts, batch = texts.len(), "Calling embedding API");

            match self.make_request(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) => {
                    if !e.is_transient() || attempts > self.config.max_retries {
                        error!(error = %e, attempts, "Embedding request failed");
                        return Err(e);
                    }

                    match backoff.next_backoff() {
                        Some(duration) => {
                            warn!(
                                error = %e,
                                retry_in_ms = duration.as_millis(),
                                "Embedding call failed, retrying"
                            );
                            tokio::time::sleep(duration).await;
                        }
                        None => {
                            error!(error = %e, "Backoff exhausted");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// Make a single API request.
    async fn make_request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let body = EmbeddingRequest {
            input: texts,
            model: &self.config.model,
            dimensions: self.config.dimension,
        };

        let request = self
            .client
            .post(self.config.url())
            .header("Content-Type", "application/json")
            .json(&body);

        let response = self.authorize(request).send().await.map_err(|e| {
            if e.is_timeout() {
                EmbeddingError::Timeout(self.config.timeout.as_millis() as u64)
            } else {
                EmbeddingError::Api(e.to_string())
            }
        })?;

        let status = response.status();
        if status == 429 {
            return Err(EmbeddingError::RateLimitExceeded);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("HTTP {}: {}", status, body);
            return Err(if status.is_client_error() {
                EmbeddingError::Rejected(message)
            } else {
                EmbeddingError::Api(message)
            });
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Parse(e.to_string()))?;

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::Parse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);

        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();
        if let Some(expected) = self.config.dimension {
            if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
                return Err(EmbeddingError::DimensionMismatch {
                    expected,
                    actual: bad.len(),
                });
            }
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingModel for ApiEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("text must not be empty".to_string()));
        }
        let mut vectors = self.call_api(&[text]).await?;
        vectors
            .pop()
            .map(Embedding::from_raw)
            .ok_or_else(|| EmbeddingError::Parse("No embedding in response".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::InvalidInput("text must not be empty".to_string()));
        }
        let vectors = self.call_api(texts).await?;
        Ok(vectors.into_iter().map(Embedding::from_raw).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn openai_config(server: &MockServer) -> ApiEmbedderConfig {
        let mut config = ApiEmbedderConfig::openai("sk-test", "text-embedding-3-small");
        config.base_url = server.uri();
        config.dimension = Some(3);
        config.max_retries = 0;
        config
    }

    #[test]
    fn test_openai_url() {
        let config = ApiEmbedderConfig::openai("k", "text-embedding-3-small");
        assert_eq!(config.url(), "https://api.openai.com/v1/embeddings");
    }

    #[test]
    fn test_azure_url() {
        let config = ApiEmbedderConfig::azure(
            "https://example.openai.azure.com/",
            "embed-small",
            "2024-02-15-preview",
            "k",
        );
        assert_eq!(
            config.url(),
            "https://example.openai.azure.com/openai/deployments/embed-small/embeddings?api-version=2024-02-15-preview"
        );
    }

    #[test]
    fn test_from_settings_requires_key() {
        let settings = EmbeddingSettings {
            api_key: None,
            api_key_env: "RECALL_TEST_NO_SUCH_KEY".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            ApiEmbedderConfig::from_settings(&settings),
            Err(EmbeddingError::Config(_))
        ));
    }

    #[test]
    fn test_from_settings_azure() {
        let settings = EmbeddingSettings {
            provider: EmbeddingProvider::Azure,
            base_url: Some("https://example.openai.azure.com".to_string()),
            deployment: Some("embed-small".to_string()),
            api_key: Some("k".to_string()),
            ..Default::default()
        };
        let config = ApiEmbedderConfig::from_settings(&settings).unwrap();
        assert!(matches!(config.flavor, ApiFlavor::Azure { .. }));
        assert_eq!(config.model, "text-embedding-3-small");
        assert_eq!(config.dimension, Some(1536));
    }

    #[tokio::test]
    async fn test_embed_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "text-embedding-3-small",
                "input": ["Likes boutique hotels"],
                "dimensions": 3
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.1, 0.2, 0.3], "index": 0}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = ApiEmbedder::new(openai_config(&server)).unwrap();
        let emb = embedder.embed("Likes boutique hotels").await.unwrap();
        assert_eq!(emb.values, vec![0.1, 0.2, 0.3]);
        assert_eq!(embedder.info().dimension, 3);
    }

    #[tokio::test]
    async fn test_azure_uses_api_key_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/embed-small/embeddings"))
            .and(query_param("api-version", "2024-02-15-preview"))
            .and(header("api-key", "azure-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [1.0, 0.0], "index": 0}]
            })))
            .mount(&server)
            .await;

        let mut config =
            ApiEmbedderConfig::azure(server.uri(), "embed-small", "2024-02-15-preview", "azure-key");
        config.max_retries = 0;
        let embedder = ApiEmbedder::new(config).unwrap();
        let emb = embedder.embed("hello").await.unwrap();
        assert_eq!(emb.dimension(), 2);
    }

    #[tokio::test]
    async fn test_batch_reorders_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"embedding": [0.0, 1.0, 0.0], "index": 1},
                    {"embedding": [1.0, 0.0, 0.0], "index": 0}
                ]
            })))
            .mount(&server)
            .await;

        let embedder = ApiEmbedder::new(openai_config(&server)).unwrap();
        let out = embedder.embed_batch(&["first", "second"]).await.unwrap();
        assert_eq!(out[0].values, vec![1.0, 0.0, 0.0]);
        assert_eq!(out[1].values, vec![0.0, 1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let embedder = ApiEmbedder::new(openai_config(&server)).unwrap();
        let result = embedder.embed("x").await;
        assert!(matches!(result, Err(EmbeddingError::RateLimitExceeded)));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = openai_config(&server);
        config.max_retries = 3;
        let embedder = ApiEmbedder::new(config).unwrap();
        let result = embedder.embed("x").await;
        assert!(matches!(result, Err(EmbeddingError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.5, 0.5, 0.0], "index": 0}]
            })))
            .mount(&server)
            .await;

        let mut config = openai_config(&server);
        config.max_retries = 2;
        let embedder = ApiEmbedder::new(config).unwrap();
        let emb = embedder.embed("x").await.unwrap();
        assert_eq!(emb.values, vec![0.5, 0.5, 0.0]);
    }

    #[tokio::test]
    async fn test_wrong_dimension_from_provider() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.5, 0.5], "index": 0}]
            })))
            .mount(&server)
            .await;

        let embedder = ApiEmbedder::new(openai_config(&server)).unwrap();
        let result = embedder.embed("x").await;
        assert!(matches!(
            result,
            Err(EmbeddingError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_empty_text_rejected_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let embedder = ApiEmbedder::new(openai_config(&server)).unwrap();
        assert!(matches!(
            embedder.embed("   ").await,
            Err(EmbeddingError::InvalidInput(_))
        ));
    }
}

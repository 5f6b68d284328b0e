//! Configuration loading for recall.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at `~/.config/recall/config.{toml,yaml,json}`.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::MemoryError;

/// Which embedding backend to talk to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// OpenAI-compatible `/embeddings` endpoint (bearer auth)
    #[default]
    Openai,
    /// Azure OpenAI deployment (`api-key` header, `api-version` query)
    Azure,
    /// Deterministic offline embedder
    Mock,
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    /// Base URL. For Azure this is the resource endpoint.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Model name (also the cache key namespace)
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Azure deployment name; defaults to `model`
    #[serde(default)]
    pub deployment: Option<String>,

    /// Azure `api-version` query parameter
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// API key (normally loaded from `api_key_env`, never written back out)
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Environment variable consulted when `api_key` is unset
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Fixed vector dimension for every namespace. `None` lets the first
    /// write to each namespace decide.
    #[serde(default = "default_dimension")]
    pub dimension: Option<usize>,

    /// Per-request timeout (ms)
    #[serde(default = "default_embedding_timeout")]
    pub timeout_ms: u64,

    /// Retries after the first attempt on transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_api_version() -> String {
    "2024-02-15-preview".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_dimension() -> Option<usize> {
    Some(1536)
}

fn default_embedding_timeout() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            base_url: None,
            model: default_embedding_model(),
            deployment: None,
            api_version: default_api_version(),
            api_key: None,
            api_key_env: default_api_key_env(),
            dimension: default_dimension(),
            timeout_ms: default_embedding_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl EmbeddingSettings {
    /// The configured key, falling back to the `api_key_env` variable.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.is_empty())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("embedding.model must not be empty".to_string());
        }
        if self.dimension == Some(0) {
            return Err("embedding.dimension must be > 0".to_string());
        }
        if self.timeout_ms == 0 {
            return Err("embedding.timeout_ms must be > 0".to_string());
        }
        if self.provider == EmbeddingProvider::Azure && self.base_url.is_none() {
            return Err("embedding.base_url is required for the azure provider".to_string());
        }
        Ok(())
    }
}

/// Embedding cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingCacheSettings {
    /// In-memory LRU capacity (entries)
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Per-entry TTL in seconds. `None` keeps entries until evicted.
    #[serde(default)]
    pub ttl_secs: Option<u64>,

    /// Mirror entries into the backing store
    #[serde(default = "default_true")]
    pub persistent: bool,
}

/// Longest TTL either cache accepts: ten years.
pub const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn default_cache_capacity() -> usize {
    10_000
}

fn default_true() -> bool {
    true
}

impl Default for EmbeddingCacheSettings {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: None,
            persistent: true,
        }
    }
}

impl EmbeddingCacheSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("embedding_cache.capacity must be > 0".to_string());
        }
        match self.ttl_secs {
            Some(0) => return Err("embedding_cache.ttl_secs must be > 0 when set".to_string()),
            Some(ttl) if ttl > MAX_TTL_SECS => {
                return Err(format!(
                    "embedding_cache.ttl_secs must be <= {MAX_TTL_SECS}, got {ttl}"
                ))
            }
            _ => {}
        }
        Ok(())
    }
}

/// Vector search mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Linear scan with exact cosine distance
    Exact,
    /// HNSW graph, candidates re-ranked exactly
    #[default]
    Hnsw,
}

/// Vector store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSettings {
    #[serde(default)]
    pub mode: SearchMode,

    /// Default distance ceiling (cosine distance)
    #[serde(default = "default_max_distance")]
    pub max_distance: f32,

    /// HNSW connectivity (M parameter)
    #[serde(default = "default_connectivity")]
    pub connectivity: usize,

    /// HNSW ef_construction
    #[serde(default = "default_expansion_add")]
    pub expansion_add: usize,

    /// HNSW ef_search
    #[serde(default = "default_expansion_search")]
    pub expansion_search: usize,

    /// Candidates fetched per requested hit before exact re-ranking
    #[serde(default = "default_oversample")]
    pub oversample: usize,

    /// Backing store timeout for index loads and writes (ms)
    #[serde(default = "default_store_timeout")]
    pub timeout_ms: u64,
}

fn default_max_distance() -> f32 {
    0.15
}

fn default_connectivity() -> usize {
    16
}

fn default_expansion_add() -> usize {
    128
}

fn default_expansion_search() -> usize {
    64
}

fn default_oversample() -> usize {
    4
}

fn default_store_timeout() -> u64 {
    5_000
}

impl Default for VectorSettings {
    fn default() -> Self {
        Self {
            mode: SearchMode::default(),
            max_distance: default_max_distance(),
            connectivity: default_connectivity(),
            expansion_add: default_expansion_add(),
            expansion_search: default_expansion_search(),
            oversample: default_oversample(),
            timeout_ms: default_store_timeout(),
        }
    }
}

impl VectorSettings {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=2.0).contains(&self.max_distance) {
            return Err(format!(
                "vector.max_distance must be 0.0-2.0, got {}",
                self.max_distance
            ));
        }
        if self.connectivity < 2 {
            return Err("vector.connectivity must be >= 2".to_string());
        }
        if self.expansion_add == 0 || self.expansion_search == 0 {
            return Err("vector.expansion_add and expansion_search must be > 0".to_string());
        }
        if self.oversample == 0 {
            return Err("vector.oversample must be > 0".to_string());
        }
        Ok(())
    }
}

/// Preference memory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceSettings {
    /// Hits returned by relevance retrieval
    #[serde(default = "default_k")]
    pub default_k: usize,

    /// Budget for read paths; exceeded reads degrade to empty (ms)
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,

    /// Budget for learn/reseed (ms)
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,
}

fn default_k() -> usize {
    3
}

fn default_read_timeout() -> u64 {
    2_000
}

fn default_write_timeout() -> u64 {
    15_000
}

impl Default for PreferenceSettings {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            read_timeout_ms: default_read_timeout(),
            write_timeout_ms: default_write_timeout(),
        }
    }
}

impl PreferenceSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.read_timeout_ms == 0 || self.write_timeout_ms == 0 {
            return Err("preferences timeouts must be > 0".to_string());
        }
        Ok(())
    }
}

/// Conversation log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSettings {
    /// Retention limit per thread
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Recent entries handed to a turn as context
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Budget for a single append/read (ms)
    #[serde(default = "default_store_timeout")]
    pub timeout_ms: u64,
}

fn default_max_entries() -> usize {
    1000
}

fn default_history_limit() -> usize {
    20
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            history_limit: default_history_limit(),
            timeout_ms: default_store_timeout(),
        }
    }
}

impl ConversationSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_entries == 0 {
            return Err("conversation.max_entries must be > 0".to_string());
        }
        if self.timeout_ms == 0 {
            return Err("conversation.timeout_ms must be > 0".to_string());
        }
        Ok(())
    }
}

/// Semantic intent cache configuration (opt-in, disabled by default).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentCacheSettings {
    /// MUST be explicitly set to true to enable (default: false).
    #[serde(default)]
    pub enabled: bool,

    /// Distance ceiling for a fingerprint match
    #[serde(default = "default_intent_max_distance")]
    pub max_distance: f32,

    /// Lifetime of a cached decision (seconds)
    #[serde(default = "default_intent_ttl")]
    pub ttl_secs: u64,

    /// Number of recent user/assistant turns in a fingerprint
    #[serde(default = "default_window")]
    pub window: usize,

    /// Lookup budget; exceeded lookups are misses (ms)
    #[serde(default = "default_read_timeout")]
    pub timeout_ms: u64,
}

fn default_intent_max_distance() -> f32 {
    0.08
}

fn default_intent_ttl() -> u64 {
    3600
}

fn default_window() -> usize {
    4
}

impl Default for IntentCacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_distance: default_intent_max_distance(),
            ttl_secs: default_intent_ttl(),
            window: default_window(),
            timeout_ms: default_read_timeout(),
        }
    }
}

impl IntentCacheSettings {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=2.0).contains(&self.max_distance) {
            return Err(format!(
                "intent_cache.max_distance must be 0.0-2.0, got {}",
                self.max_distance
            ));
        }
        if self.ttl_secs == 0 || self.ttl_secs > MAX_TTL_SECS {
            return Err(format!(
                "intent_cache.ttl_secs must be 1-{MAX_TTL_SECS}, got {}",
                self.ttl_secs
            ));
        }
        if self.window == 0 {
            return Err("intent_cache.window must be > 0".to_string());
        }
        Ok(())
    }
}

/// Background job configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// IANA timezone for cron expressions
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Sweep expired intent-cache entries
    #[serde(default = "default_intent_sweep_cron")]
    pub intent_sweep_cron: String,

    /// Trim every thread to `conversation.max_entries`
    #[serde(default = "default_retention_cron")]
    pub retention_cron: String,

    /// Purge expired persistent embedding-cache entries
    #[serde(default = "default_embedding_purge_cron")]
    pub embedding_cache_purge_cron: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_intent_sweep_cron() -> String {
    "0 */10 * * * *".to_string()
}

fn default_retention_cron() -> String {
    "0 15 3 * * *".to_string()
}

fn default_embedding_purge_cron() -> String {
    "0 45 3 * * *".to_string()
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            intent_sweep_cron: default_intent_sweep_cron(),
            retention_cron: default_retention_cron(),
            embedding_cache_purge_cron: default_embedding_purge_cron(),
        }
    }
}

impl SchedulerSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.timezone.trim().is_empty() {
            return Err("scheduler.timezone must not be empty".to_string());
        }
        Ok(())
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to RocksDB storage directory
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub embedding: EmbeddingSettings,

    #[serde(default)]
    pub embedding_cache: EmbeddingCacheSettings,

    #[serde(default)]
    pub vector: VectorSettings,

    #[serde(default)]
    pub preferences: PreferenceSettings,

    #[serde(default)]
    pub conversation: ConversationSettings,

    #[serde(default)]
    pub intent_cache: IntentCacheSettings,

    #[serde(default)]
    pub scheduler: SchedulerSettings,
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", "recall")
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_level: default_log_level(),
            embedding: EmbeddingSettings::default(),
            embedding_cache: EmbeddingCacheSettings::default(),
            vector: VectorSettings::default(),
            preferences: PreferenceSettings::default(),
            conversation: ConversationSettings::default(),
            intent_cache: IntentCacheSettings::default(),
            scheduler: SchedulerSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/recall/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (RECALL_*, nested keys use `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, MemoryError> {
        let config_dir = ProjectDirs::from("", "", "recall")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(|e| MemoryError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| MemoryError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // RECALL_DB_PATH, RECALL_EMBEDDING__PROVIDER, RECALL_VECTOR__MODE, ...
        builder = builder.add_source(
            Environment::with_prefix("RECALL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| MemoryError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| MemoryError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), MemoryError> {
        self.embedding
            .validate()
            .and_then(|_| self.embedding_cache.validate())
            .and_then(|_| self.vector.validate())
            .and_then(|_| self.preferences.validate())
            .and_then(|_| self.conversation.validate())
            .and_then(|_| self.intent_cache.validate())
            .and_then(|_| self.scheduler.validate())
            .map_err(MemoryError::Config)
    }

    /// Expand ~ and environment variables in db_path
    pub fn expanded_db_path(&self) -> PathBuf {
        match shellexpand::full(&self.db_path) {
            Ok(expanded) => PathBuf::from(expanded.as_ref()),
            Err(_) => PathBuf::from(shellexpand::tilde(&self.db_path).as_ref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.embedding.provider, EmbeddingProvider::Openai);
        assert_eq!(settings.embedding.model, "text-embedding-3-small");
        assert_eq!(settings.embedding.dimension, Some(1536));
        assert!((settings.vector.max_distance - 0.15).abs() < f32::EPSILON);
        assert_eq!(settings.conversation.max_entries, 1000);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_intent_cache_disabled_by_default() {
        let config = IntentCacheSettings::default();
        assert!(!config.enabled);
        assert_eq!(config.window, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_section_validation() {
        let mut vector = VectorSettings::default();
        vector.max_distance = 3.0;
        assert!(vector.validate().is_err());

        let mut conversation = ConversationSettings::default();
        conversation.max_entries = 0;
        assert!(conversation.validate().is_err());

        let azure = EmbeddingSettings {
            provider: EmbeddingProvider::Azure,
            ..Default::default()
        };
        assert!(azure.validate().is_err());

        let cache = EmbeddingCacheSettings {
            ttl_secs: Some(0),
            ..Default::default()
        };
        assert!(cache.validate().is_err());
    }

    #[test]
    fn test_ttl_upper_bound() {
        let cache = EmbeddingCacheSettings {
            ttl_secs: Some(MAX_TTL_SECS + 1),
            ..Default::default()
        };
        assert!(cache.validate().is_err());
        let cache = EmbeddingCacheSettings {
            ttl_secs: Some(MAX_TTL_SECS),
            ..Default::default()
        };
        assert!(cache.validate().is_ok());

        let mut intent = IntentCacheSettings::default();
        intent.ttl_secs = 10_000_000_000_000;
        assert!(intent.validate().is_err());
        intent.ttl_secs = MAX_TTL_SECS;
        assert!(intent.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recall.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
db_path = "/tmp/recall-test"

[embedding]
provider = "mock"
dimension = 64

[vector]
mode = "exact"
max_distance = 0.2

[intent_cache]
enabled = true
"#
        )
        .unwrap();

        let settings = Settings::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(settings.db_path, "/tmp/recall-test");
        assert_eq!(settings.embedding.provider, EmbeddingProvider::Mock);
        assert_eq!(settings.embedding.dimension, Some(64));
        assert_eq!(settings.vector.mode, SearchMode::Exact);
        assert!(settings.intent_cache.enabled);
        // Untouched sections keep their defaults
        assert_eq!(settings.preferences.default_k, 3);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[conversation]\nmax_entries = 0\n").unwrap();
        let result = Settings::load(Some(path.to_str().unwrap()));
        assert!(matches!(result, Err(MemoryError::Config(_))));
    }

    #[test]
    fn test_resolved_api_key_prefers_explicit() {
        let settings = EmbeddingSettings {
            api_key: Some("sk-explicit".to_string()),
            api_key_env: "RECALL_TEST_UNSET_KEY_VAR".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.resolved_api_key().as_deref(), Some("sk-explicit"));

        let settings = EmbeddingSettings {
            api_key: None,
            api_key_env: "RECALL_TEST_UNSET_KEY_VAR".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.resolved_api_key(), None);
    }

    #[test]
    fn test_expanded_db_path_plain() {
        let settings = Settings {
            db_path: "/var/lib/recall".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.expanded_db_path(), PathBuf::from("/var/lib/recall"));
    }
}

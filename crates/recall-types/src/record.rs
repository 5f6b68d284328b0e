//! Vector store record types.
//!
//! A record is the unit stored in the vector store: an immutable
//! `(text, vector, metadata)` triple living in exactly one namespace.
//! Records are never updated in place; they are only deleted.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::MemoryError;

/// Namespace prefix for per-user preference partitions.
pub const PREFERENCES_PREFIX: &str = "preferences:";

/// Namespace prefix for intent-cache partitions.
pub const INTENT_CACHE_PREFIX: &str = "intent-cache:";

/// Scope used for intent-cache entries not tied to a user.
pub const GLOBAL_SCOPE: &str = "global";

/// Intent-cache scope prefix of per-user entries, so no user name can
/// collide with [`GLOBAL_SCOPE`].
pub const USER_SCOPE_PREFIX: &str = "user:";

/// Well-known metadata key: owning user.
pub const META_USER: &str = "user";
/// Well-known metadata key: provenance (`seed` / `learned`).
pub const META_SOURCE: &str = "source";
/// Well-known metadata key: creation time in ms since epoch.
pub const META_TIMESTAMP: &str = "timestamp";
/// Well-known metadata key: TTL expiry instant in ms since epoch.
pub const META_EXPIRES_AT: &str = "expires_at";

/// Separator between namespace and record id in storage keys.
const KEY_SEPARATOR: char = '|';

/// A logical partition of the vector store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

impl Namespace {
    /// Create a namespace, rejecting names that cannot be embedded in keys.
    pub fn new(name: impl Into<String>) -> Result<Self, MemoryError> {
        let name = name.into();
        if name.is_empty() {
            return Err(MemoryError::InvalidInput(
                "namespace must not be empty".to_string(),
            ));
        }
        if name.contains(KEY_SEPARATOR) || name.chars().any(char::is_control) {
            return Err(MemoryError::InvalidInput(format!(
                "namespace contains a reserved character: {:?}",
                name
            )));
        }
        Ok(Self(name))
    }

    /// Namespace holding the preferences of `user`.
    pub fn preferences(user: &str) -> Result<Self, MemoryError> {
        if user.trim().is_empty() {
            return Err(MemoryError::InvalidInput("user must not be empty".to_string()));
        }
        Self::new(format!("{}{}", PREFERENCES_PREFIX, user))
    }

    /// Namespace holding intent-cache entries for `scope`.
    pub fn intent_cache(scope: &str) -> Result<Self, MemoryError> {
        if scope.trim().is_empty() {
            return Err(MemoryError::InvalidInput("scope must not be empty".to_string()));
        }
        Self::new(format!("{}{}", INTENT_CACHE_PREFIX, scope))
    }

    /// Intent-cache namespace of `user`.
    pub fn user_intent_cache(user: &str) -> Result<Self, MemoryError> {
        if user.trim().is_empty() {
            return Err(MemoryError::InvalidInput("user must not be empty".to_string()));
        }
        Self::intent_cache(&format!("{}{}", USER_SCOPE_PREFIX, user))
    }

    /// Intent-cache namespace shared by requests without a user.
    pub fn global_intent_cache() -> Self {
        Self(format!("{}{}", INTENT_CACHE_PREFIX, GLOBAL_SCOPE))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part after `prefix`, if this namespace starts with it.
    pub fn suffix_after(&self, prefix: &str) -> Option<&str> {
        self.0.strip_prefix(prefix)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Namespace {
    type Error = MemoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Namespace::new(value)
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> Self {
        ns.0
    }
}

/// Scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    /// False for NaN and infinite floats, which do not survive JSON.
    pub fn is_finite(&self) -> bool {
        match self {
            MetadataValue::Float(v) => v.is_finite(),
            _ => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetadataValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

/// Record metadata: string keys to scalar values, ordered for stable encoding.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Provenance of a stored preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    /// Loaded from seed data by an explicit reseed
    Seed,
    /// Learned from a conversation
    Learned,
}

impl RecordSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordSource::Seed => "seed",
            RecordSource::Learned => "learned",
        }
    }
}

impl fmt::Display for RecordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecordSource {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "seed" => Ok(RecordSource::Seed),
            "learned" => Ok(RecordSource::Learned),
            other => Err(MemoryError::InvalidInput(format!(
                "unknown record source: {}",
                other
            ))),
        }
    }
}

/// Opaque record identifier (ULID string).
pub type RecordId = String;

/// A stored vector record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub namespace: Namespace,
    pub text: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Record {
    /// Creation time in ms since epoch, if the record carries one.
    pub fn timestamp_ms(&self) -> Option<i64> {
        self.metadata.get(META_TIMESTAMP).and_then(MetadataValue::as_i64)
    }

    /// TTL expiry instant in ms since epoch, if any.
    pub fn expires_at_ms(&self) -> Option<i64> {
        self.metadata.get(META_EXPIRES_AT).and_then(MetadataValue::as_i64)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at_ms()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }

    /// Whether the record's TTL has elapsed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at_ms()
            .map(|expiry| expiry <= now.timestamp_millis())
            .unwrap_or(false)
    }

    pub fn user(&self) -> Option<&str> {
        self.metadata.get(META_USER).and_then(MetadataValue::as_str)
    }

    pub fn source(&self) -> Option<RecordSource> {
        self.metadata
            .get(META_SOURCE)
            .and_then(MetadataValue::as_str)
            .and_then(|s| s.parse().ok())
    }

    /// Serialize record to JSON bytes for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize record from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Result of a similarity query. Never stored.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub record: Record,
    /// Cosine similarity in [-1, 1]
    pub similarity: f32,
    /// Cosine distance, `1 - similarity`
    pub distance: f32,
}

impl CacheHit {
    pub fn new(record: Record, distance: f32) -> Self {
        Self {
            record,
            similarity: 1.0 - distance,
            distance,
        }
    }
}

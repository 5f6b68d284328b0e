//! Key encoding and decoding for storage layer.
//!
//! Key formats:
//! - records:       `rec:{namespace}|{ulid}`
//! - namespaces:    `ns:{namespace}`
//! - conversations: `conv:{thread_id}|{sequence:020}`
//! - thread_heads:  `head:{thread_id}`
//! - embedding_cache: `emb:{hex digest}`
//!
//! The `|` separator never appears inside a namespace or thread id, so a
//! prefix scan over `rec:{namespace}|` cannot bleed into a namespace that
//! merely shares a textual prefix. ULIDs and zero-padded sequences sort
//! lexicographically in insertion order.

use crate::error::StorageError;

const SEPARATOR: char = '|';

/// Reject identifiers that cannot be embedded in a key.
pub fn validate_component(kind: &str, value: &str) -> Result<(), StorageError> {
    if value.is_empty() {
        return Err(StorageError::Key(format!("{} must not be empty", kind)));
    }
    if value.contains(SEPARATOR) || value.chars().any(char::is_control) {
        return Err(StorageError::Key(format!(
            "{} contains a reserved character: {:?}",
            kind, value
        )));
    }
    Ok(())
}

/// Key for a vector store record
/// Format: rec:{namespace}|{ulid}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKey {
    pub namespace: String,
    pub id: String,
}

impl RecordKey {
    pub fn new(namespace: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("rec:{}{}{}", self.namespace, SEPARATOR, self.id).into_bytes()
    }

    /// Prefix covering every record of `namespace`
    pub fn namespace_prefix(namespace: &str) -> Vec<u8> {
        format!("rec:{}{}", namespace, SEPARATOR).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;
        let rest = s
            .strip_prefix("rec:")
            .ok_or_else(|| StorageError::Key(format!("Invalid record key format: {}", s)))?;
        let (namespace, id) = rest
            .rsplit_once(SEPARATOR)
            .ok_or_else(|| StorageError::Key(format!("Invalid record key format: {}", s)))?;
        Ok(Self::new(namespace, id))
    }
}

/// Key for namespace metadata
/// Format: ns:{namespace}
pub struct NamespaceKey;

impl NamespaceKey {
    pub fn to_bytes(namespace: &str) -> Vec<u8> {
        format!("ns:{}", namespace).into_bytes()
    }

    pub fn prefix(namespace_prefix: &str) -> Vec<u8> {
        format!("ns:{}", namespace_prefix).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<String, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;
        s.strip_prefix("ns:")
            .map(str::to_string)
            .ok_or_else(|| StorageError::Key(format!("Invalid namespace key format: {}", s)))
    }
}

/// Key for a conversation entry
/// Format: conv:{thread_id}|{sequence:020}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationKey {
    pub thread_id: String,
    pub sequence: u64,
}

impl ConversationKey {
    pub fn new(thread_id: impl Into<String>, sequence: u64) -> Self {
        Self {
            thread_id: thread_id.into(),
            sequence,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("conv:{}{}{:020}", self.thread_id, SEPARATOR, self.sequence).into_bytes()
    }

    pub fn thread_prefix(thread_id: &str) -> Vec<u8> {
        format!("conv:{}{}", thread_id, SEPARATOR).into_bytes()
    }
}

/// Key for a thread head
/// Format: head:{thread_id}
pub struct ThreadHeadKey;

impl ThreadHeadKey {
    pub fn to_bytes(thread_id: &str) -> Vec<u8> {
        format!("head:{}", thread_id).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<String, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;
        s.strip_prefix("head:")
            .map(str::to_string)
            .ok_or_else(|| StorageError::Key(format!("Invalid thread head key format: {}", s)))
    }
}

/// Key for a persisted embedding
/// Format: emb:{digest}
pub struct EmbeddingKey;

impl EmbeddingKey {
    pub fn to_bytes(digest: &str) -> Vec<u8> {
        format!("emb:{}", digest).into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_key_roundtrip() {
        let key = RecordKey::new("preferences:Mark", "01HN4QXKN6YWXVKZ3JMHP4BCDE");
        let decoded = RecordKey::from_bytes(&key.to_bytes()).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn test_record_prefix_does_not_match_sibling_namespace() {
        let prefix = RecordKey::namespace_prefix("preferences:Mark");
        let sibling = RecordKey::new("preferences:Markus", "01HN4QXKN6YWXVKZ3JMHP4BCDE");
        assert!(!sibling.to_bytes().starts_with(&prefix));
        let own = RecordKey::new("preferences:Mark", "01HN4QXKN6YWXVKZ3JMHP4BCDE");
        assert!(own.to_bytes().starts_with(&prefix));
    }

    #[test]
    fn test_conversation_key_lexicographic_order() {
        let k9 = ConversationKey::new("t1", 9).to_bytes();
        let k10 = ConversationKey::new("t1", 10).to_bytes();
        assert!(k9 < k10);
        assert!(k10.starts_with(&ConversationKey::thread_prefix("t1")));
    }

    #[test]
    fn test_validate_component() {
        assert!(validate_component("thread_id", "thread-1").is_ok());
        assert!(validate_component("thread_id", "").is_err());
        assert!(validate_component("thread_id", "a|b").is_err());
        assert!(validate_component("thread_id", "a\tb").is_err());
    }

    #[test]
    fn test_namespace_and_head_keys() {
        let ns = NamespaceKey::to_bytes("intent-cache:global");
        assert_eq!(NamespaceKey::from_bytes(&ns).unwrap(), "intent-cache:global");
        let head = ThreadHeadKey::to_bytes("thread-9");
        assert_eq!(ThreadHeadKey::from_bytes(&head).unwrap(), "thread-9");
    }
}

//! Intent cache payload.

use serde::{Deserialize, Serialize};

use crate::record::MetadataValue;

/// Metadata key holding the serialized decision on an intent-cache record.
pub const META_DECISION: &str = "decision";

/// A previously computed agent decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedDecision {
    /// Tool selected by the orchestrator, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,

    /// Tool arguments as JSON
    #[serde(default)]
    pub arguments: serde_json::Value,

    /// Final response text, if one was produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl CachedDecision {
    pub fn tool(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            tool: Some(name.into()),
            arguments,
            response: None,
        }
    }

    pub fn response(text: impl Into<String>) -> Self {
        Self {
            tool: None,
            arguments: serde_json::Value::Null,
            response: Some(text.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tool.is_none() && self.response.is_none()
    }

    /// Encode as a metadata value for storage on a record.
    pub fn to_metadata(&self) -> Result<MetadataValue, serde_json::Error> {
        serde_json::to_string(self).map(MetadataValue::Text)
    }

    /// Decode from a record metadata value.
    pub fn from_metadata(value: &MetadataValue) -> Option<Self> {
        value.as_str().and_then(|s| serde_json::from_str(s).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_roundtrip() {
        let decision = CachedDecision::tool(
            "search_events",
            serde_json::json!({"city": "new york", "sport": "NBA"}),
        );
        let value = decision.to_metadata().unwrap();
        assert_eq!(CachedDecision::from_metadata(&value), Some(decision));
    }

    #[test]
    fn test_from_metadata_rejects_non_text() {
        assert_eq!(CachedDecision::from_metadata(&MetadataValue::Int(3)), None);
        assert_eq!(
            CachedDecision::from_metadata(&MetadataValue::Text("nope".into())),
            None
        );
    }

    #[test]
    fn test_is_empty() {
        assert!(CachedDecision::default().is_empty());
        assert!(!CachedDecision::response("Enjoy the game!").is_empty());
    }
}

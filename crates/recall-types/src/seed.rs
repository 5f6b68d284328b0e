//! Seed data for explicit preference reseeding.
//!
//! File format:
//!
//! ```json
//! {"user_memories": {"Mark": [{"insight": "Prefers aisle seats"}]}}
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::MemoryError;

/// One seeded preference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedInsight {
    pub insight: String,
}

/// Parsed seed file. Users are kept in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub user_memories: BTreeMap<String, Vec<SeedInsight>>,
}

impl SeedData {
    /// Read and parse a seed file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, MemoryError> {
        let data: SeedData = serde_json::from_slice(bytes)?;
        if let Some(user) = data.user_memories.keys().find(|u| u.trim().is_empty()) {
            return Err(MemoryError::InvalidInput(format!(
                "seed data contains an empty user name: {:?}",
                user
            )));
        }
        Ok(data)
    }

    pub fn is_empty(&self) -> bool {
        self.user_memories.is_empty()
    }

    pub fn users(&self) -> impl Iterator<Item = &str> {
        self.user_memories.keys().map(String::as_str)
    }

    /// Non-blank insights for `user`.
    pub fn insights_for(&self, user: &str) -> Vec<&str> {
        self.user_memories
            .get(user)
            .map(|items| {
                items
                    .iter()
                    .map(|i| i.insight.as_str())
                    .filter(|text| !text.trim().is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total number of insights across all users.
    pub fn insight_count(&self) -> usize {
        self.user_memories.values().map(Vec::len).sum()
    }
}

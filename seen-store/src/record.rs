//! Order record types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One listing item as read from a rendered snippet.
///
/// Identity is `id` alone: two records with the same id describe the same
/// real-world item even if the other fields drifted between renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Item identity; empty when the snippet carried no readable id
    pub id: String,

    pub title: String,

    pub description: String,

    /// Auxiliary fields (price, deadline, ...) keyed by configured name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub raw_fields: BTreeMap<String, String>,
}

impl OrderRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            raw_fields: BTreeMap::new(),
        }
    }

    /// Whether the record has an identity at all
    pub fn has_identity(&self) -> bool {
        !self.id.trim().is_empty()
    }

    /// Text the relevance filter looks at
    pub fn searchable_text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }
}

/// One line of the output log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    /// When the record was emitted (RFC 3339, UTC)
    pub found_at: String,

    #[serde(flatten)]
    pub record: OrderRecord,
}

impl StoredRecord {
    pub fn now(record: OrderRecord) -> Self {
        Self {
            found_at: chrono::Utc::now().to_rfc3339(),
            record,
        }
    }
}

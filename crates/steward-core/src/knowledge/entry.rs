//! Knowledge entries and the knowledge document format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One retrievable knowledge fact.
///
/// Immutable once loaded; a new load replaces the whole set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeEntry {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Applicability scope (which surfaces/domains the entry applies to).
    #[serde(default)]
    pub applies_to: Vec<String>,
    /// Priority weight in `[0, 1]`, used as a ranking tie-nudge.
    #[serde(default)]
    pub priority: f64,
    pub content: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Top-level knowledge document shape.
#[derive(Debug, Clone, Deserialize)]
pub struct KnowledgeDocument {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub entries: Vec<Value>,
}

/// Parse a knowledge document, dropping entries without `id` or `content`.
pub fn parse_document(value: &Value) -> Vec<KnowledgeEntry> {
    let Ok(doc) = serde_json::from_value::<KnowledgeDocument>(value.clone()) else {
        tracing::warn!("knowledge document has an unexpected top-level shape");
        return Vec::new();
    };

    let mut entries = Vec::with_capacity(doc.entries.len());
    for raw in doc.entries {
        let has_id = raw.get("id").and_then(Value::as_str).is_some_and(|s| !s.is_empty());
        let has_content = raw
            .get("content")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.is_empty());
        if !has_id || !has_content {
            tracing::debug!("dropping knowledge entry without id or content");
            continue;
        }
        match serde_json::from_value::<KnowledgeEntry>(raw) {
            Ok(mut entry) => {
                entry.priority = entry.priority.clamp(0.0, 1.0);
                entries.push(entry);
            }
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed knowledge entry");
            }
        }
    }
    entries
}

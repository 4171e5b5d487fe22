//! The grounding pack: the bounded context bundle consumed by the
//! completion collaborator, with provenance trace and diagnostics.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::snapshot::{SnapshotCounts, WorkspaceSnapshot};
use crate::knowledge::KnowledgeEntry;

/// Hex sha-256 of a value's canonical JSON serialization.
pub fn content_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// One hashed pack section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SectionPack {
    pub hash: String,
    pub payload: Value,
}

impl SectionPack {
    pub fn new(payload: Value) -> Self {
        Self {
            hash: content_hash(&payload),
            payload,
        }
    }

    pub fn empty() -> Self {
        Self::new(Value::Null)
    }
}

/// Knowledge retrieval section of a pack.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct KbRetrieved {
    /// Hash of the full loaded knowledge set the retrieval ran against.
    pub hash: String,
    pub used_entry_ids: Vec<String>,
    pub entries: Vec<KnowledgeEntry>,
}

/// A source that was deliberately not consulted, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedSource {
    pub source: String,
    pub reason: String,
}

/// Provenance trace: which sources fed the pack and which were skipped.
/// This is a tested contract, not incidental logging.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PackTrace {
    pub used_sources: Vec<String>,
    pub not_used: Vec<SkippedSource>,
    pub budget_exceeded: bool,
    pub kb_source: String,
    pub kb_cache_hit: bool,
}

impl PackTrace {
    pub fn used(&mut self, source: &str) {
        self.used_sources.push(source.to_string());
    }

    pub fn skipped(&mut self, source: &str, reason: &str) {
        self.not_used.push(SkippedSource {
            source: source.to_string(),
            reason: reason.to_string(),
        });
    }
}

/// What the caller should do with the pack.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    #[default]
    Proceed,
    /// Required grounding is absent for a fact-sensitive query; the
    /// completion call must not happen.
    CannotAnswer,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Diagnostics {
    /// Deterministic list of absent context, e.g. `kb_empty`,
    /// `workspace_snapshot_unavailable`, `identity.persona`.
    pub missing_keys: Vec<String>,
    pub recommended_action: RecommendedAction,
    #[serde(default)]
    pub counts: SnapshotCounts,
    #[serde(default)]
    pub memory_items: usize,
}

/// One bounded context bundle for one turn. Built fresh per request; never
/// mutated after construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroundingPack {
    pub identity_pack: SectionPack,
    pub kb_retrieved: KbRetrieved,
    pub notion_snapshot: WorkspaceSnapshot,
    pub memory_snapshot: SectionPack,
    pub diagnostics: Diagnostics,
    pub trace: PackTrace,
}

impl GroundingPack {
    /// Whether the completion call is allowed to proceed.
    pub fn can_proceed(&self) -> bool {
        self.diagnostics.recommended_action == RecommendedAction::Proceed
    }
}

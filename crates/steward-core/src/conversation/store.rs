//! Durable per-conversation state: bounded turn history plus session
//! metadata (including pending proposals).
//!
//! One JSON document per process, guarded by a mutex for the whole
//! read-modify-write-replace cycle and persisted via write-to-temp then
//! atomic rename, so a crash mid-write cannot corrupt the store.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Marker appended whenever a turn side is cut to the character budget.
pub const TRUNCATION_MARKER: &str = "…[truncated]";

/// One user/assistant exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub user: String,
    pub assistant: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ConversationRecord {
    #[serde(default)]
    turns: Vec<ConversationTurn>,
    #[serde(default)]
    meta: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct StateDocument {
    #[serde(default)]
    conversations: BTreeMap<String, ConversationRecord>,
}

/// Bounded recent-history view of one conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSummary {
    pub turns: Vec<ConversationTurn>,
    pub rendered: String,
}

/// The durable conversation-state document.
pub struct ConversationStore {
    path: PathBuf,
    doc: Mutex<StateDocument>,
}

impl ConversationStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: PathBuf) -> Result<Self> {
        let doc = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "state document unreadable, starting fresh");
                StateDocument::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StateDocument::default(),
            Err(e) => {
                return Err(e).context(format!("reading state document {}", path.display()))
            }
        };

        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }

    /// Append one turn, evicting the oldest beyond `max_turns` and cutting
    /// each side to `max_chars_per_turn` with an explicit marker.
    pub fn append_turn(
        &self,
        conversation_id: &str,
        user: &str,
        assistant: &str,
        max_turns: usize,
        max_chars_per_turn: usize,
    ) -> Result<()> {
        let mut doc = self.doc.lock();
        let record = doc
            .conversations
            .entry(conversation_id.to_string())
            .or_default();

        record.turns.push(ConversationTurn {
            user: truncate_with_marker(user, max_chars_per_turn),
            assistant: truncate_with_marker(assistant, max_chars_per_turn),
            timestamp: Utc::now(),
        });

        if record.turns.len() > max_turns {
            let excess = record.turns.len() - max_turns;
            record.turns.drain(..excess);
        }

        self.persist(&doc)
    }

    /// Last `max_turns` pairs, each side re-cut to `max_chars`.
    pub fn get_summary(
        &self,
        conversation_id: &str,
        max_turns: usize,
        max_chars: usize,
    ) -> ConversationSummary {
        let doc = self.doc.lock();
        let turns: Vec<ConversationTurn> = doc
            .conversations
            .get(conversation_id)
            .map(|record| {
                record
                    .turns
                    .iter()
                    .rev()
                    .take(max_turns)
                    .rev()
                    .map(|turn| ConversationTurn {
                        user: truncate_with_marker(&turn.user, max_chars),
                        assistant: truncate_with_marker(&turn.assistant, max_chars),
                        timestamp: turn.timestamp,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let rendered = turns
            .iter()
            .map(|turn| format!("User: {}\nAssistant: {}", turn.user, turn.assistant))
            .collect::<Vec<_>>()
            .join("\n");

        ConversationSummary { turns, rendered }
    }

    pub fn get_meta(&self, conversation_id: &str) -> BTreeMap<String, Value> {
        self.doc
            .lock()
            .conversations
            .get(conversation_id)
            .map(|record| record.meta.clone())
            .unwrap_or_default()
    }

    /// Merge `updates` into the conversation's metadata; a `null` value
    /// removes the key.
    pub fn update_meta(
        &self,
        conversation_id: &str,
        updates: BTreeMap<String, Value>,
    ) -> Result<()> {
        let mut doc = self.doc.lock();
        let record = doc
            .conversations
            .entry(conversation_id.to_string())
            .or_default();

        for (key, value) in updates {
            if value.is_null() {
                record.meta.remove(&key);
            } else {
                record.meta.insert(key, value);
            }
        }

        self.persist(&doc)
    }

    /// Write the document to a temp file in the same directory, sync it,
    /// then atomically rename over the target.
    fn persist(&self, doc: &StateDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }

        let bytes = serde_json::to_vec_pretty(doc)?;
        let temp_path = temp_path_for(&self.path)?;

        let mut file = File::create(&temp_path)
            .with_context(|| format!("creating {}", temp_path.display()))?;
        if let Err(e) = file.write_all(&bytes).and_then(|_| file.sync_all()) {
            let _ = fs::remove_file(&temp_path);
            return Err(e).context("writing state document");
        }
        drop(file);

        fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            anyhow::anyhow!("replacing {}: {}", self.path.display(), e)
        })
    }
}

fn temp_path_for(target: &Path) -> Result<PathBuf> {
    let parent = target.parent().unwrap_or(Path::new("."));
    let filename = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("invalid state document path"))?;
    Ok(parent.join(format!(".{filename}.tmp")))
}

/// Char-based cut (UTF-8 safe) with the explicit marker; never silent.
fn truncate_with_marker(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{}{}", kept.trim_end(), TRUNCATION_MARKER)
}

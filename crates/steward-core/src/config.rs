//! Environment-backed configuration for the core pipeline.
//!
//! Every knob has a default so the core runs with zero configuration; the
//! environment overrides individual values.

use std::path::PathBuf;
use std::time::Duration;

/// Which backend supplies the knowledge set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KnowledgeSourceKind {
    #[default]
    File,
    Remote,
}

/// Configuration for the core pipeline.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Knowledge backend selector (`STEWARD_KB_SOURCE`: `file` | `remote`).
    pub kb_source: KnowledgeSourceKind,
    /// Knowledge cache time-to-live (`STEWARD_KB_CACHE_TTL_SECS`).
    pub kb_cache_ttl: Duration,
    /// Retrieval entry cap (`STEWARD_KB_TOP_K`).
    pub kb_top_k: usize,
    /// Byte budget for the workspace snapshot section (`STEWARD_SNAPSHOT_MAX_BYTES`).
    pub snapshot_max_bytes: usize,
    /// Max targeted workspace reads per pack build (`STEWARD_SNAPSHOT_MAX_CALLS`).
    /// Zero disables targeted reads entirely.
    pub snapshot_max_calls: usize,
    /// Conversation state document path (`STEWARD_STATE_PATH`).
    pub state_path: PathBuf,
    /// Retained turn pairs per conversation (`STEWARD_MAX_TURNS`).
    pub max_turns: usize,
    /// Character budget per turn side (`STEWARD_MAX_TURN_CHARS`).
    pub max_turn_chars: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            kb_source: KnowledgeSourceKind::File,
            kb_cache_ttl: Duration::from_secs(300),
            kb_top_k: 6,
            snapshot_max_bytes: 48 * 1024,
            snapshot_max_calls: 4,
            state_path: default_state_path(),
            max_turns: 12,
            max_turn_chars: 1200,
        }
    }
}

impl CoreConfig {
    /// Build a config from the environment, falling back to defaults for
    /// anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            kb_source: match std::env::var("STEWARD_KB_SOURCE").ok().as_deref() {
                Some("remote") => KnowledgeSourceKind::Remote,
                Some("file") => KnowledgeSourceKind::File,
                Some(other) => {
                    tracing::warn!(value = other, "unknown STEWARD_KB_SOURCE, using file");
                    KnowledgeSourceKind::File
                }
                None => defaults.kb_source,
            },
            kb_cache_ttl: env_u64("STEWARD_KB_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.kb_cache_ttl),
            kb_top_k: env_usize("STEWARD_KB_TOP_K").unwrap_or(defaults.kb_top_k),
            snapshot_max_bytes: env_usize("STEWARD_SNAPSHOT_MAX_BYTES")
                .unwrap_or(defaults.snapshot_max_bytes),
            snapshot_max_calls: env_usize("STEWARD_SNAPSHOT_MAX_CALLS")
                .unwrap_or(defaults.snapshot_max_calls),
            state_path: std::env::var("STEWARD_STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_path),
            max_turns: env_usize("STEWARD_MAX_TURNS").unwrap_or(defaults.max_turns),
            max_turn_chars: env_usize("STEWARD_MAX_TURN_CHARS").unwrap_or(defaults.max_turn_chars),
        }
    }
}

/// Default location for the durable state document.
fn default_state_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".steward")
        .join("state.json")
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse().ok()
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.parse().ok()
}

//! Workspace snapshot handling: nested payload unwrap, counts, and the
//! all-or-nothing byte-budget redaction.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Live business-state snapshot as carried inside a grounding pack.
///
/// Redaction replaces the record collections with empty ones and flags the
/// snapshot; a collection is never truncated mid-list.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WorkspaceSnapshot {
    #[serde(default)]
    pub goals: Vec<Value>,
    #[serde(default)]
    pub tasks: Vec<Value>,
    #[serde(default)]
    pub projects: Vec<Value>,
    #[serde(default)]
    pub redacted: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<String>,
}

/// Per-section record counts, used for diagnostics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SnapshotCounts {
    pub goals: usize,
    pub tasks: usize,
    pub projects: usize,
}

impl WorkspaceSnapshot {
    /// Parse a provider value, unwrapping the nested payload shape first.
    pub fn from_provider_value(value: &Value) -> Self {
        let inner = unwrap_payload(value);
        serde_json::from_value(inner.clone()).unwrap_or_else(|e| {
            warn!(error = %e, "workspace snapshot payload has an unexpected shape");
            Self::default()
        })
    }

    pub fn counts(&self) -> SnapshotCounts {
        SnapshotCounts {
            goals: self.goals.len(),
            tasks: self.tasks.len(),
            projects: self.projects.len(),
        }
    }

    /// Serialized size in bytes, as counted against the byte budget.
    pub fn serialized_len(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(usize::MAX)
    }

    /// Replace all record collections with empty ones and mark the snapshot
    /// as redacted.
    pub fn redact(&mut self, annotation: &str) {
        self.goals.clear();
        self.tasks.clear();
        self.projects.clear();
        self.redacted = true;
        self.annotations.push(annotation.to_string());
    }

    /// Enforce the byte budget: over-budget snapshots go fully empty, never
    /// partially truncated. Returns whether redaction happened.
    pub fn enforce_budget(&mut self, max_bytes: usize) -> bool {
        if self.serialized_len() <= max_bytes {
            return false;
        }
        warn!(
            size = self.serialized_len(),
            budget = max_bytes,
            "workspace snapshot over byte budget, redacting"
        );
        self.redact("budget_exceeded");
        true
    }
}

/// Unwrap the provider's nested payload shape: `{data: {payload: {...}}}`,
/// `{payload: {...}}`, `{result: {...}}`, or the bare object.
pub fn unwrap_payload(value: &Value) -> &Value {
    let mut current = value;
    loop {
        let next = ["data", "payload", "result"]
            .iter()
            .find_map(|key| current.get(*key))
            .filter(|v| v.is_object());
        match next {
            Some(inner) => current = inner,
            None => return current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwraps_nested_payload_shapes() {
        let wrapped = json!({"data": {"payload": {"goals": [{"id": "g1"}], "tasks": []}}});
        let snapshot = WorkspaceSnapshot::from_provider_value(&wrapped);
        assert_eq!(snapshot.counts().goals, 1);

        let bare = json!({"tasks": [{"id": "t1"}, {"id": "t2"}]});
        let snapshot = WorkspaceSnapshot::from_provider_value(&bare);
        assert_eq!(snapshot.counts().tasks, 2);
    }

    #[test]
    fn unexpected_shape_degrades_to_empty() {
        let snapshot = WorkspaceSnapshot::from_provider_value(&json!({"goals": "not-a-list"}));
        assert_eq!(snapshot, WorkspaceSnapshot::default());
    }

    #[test]
    fn over_budget_snapshot_is_fully_redacted() {
        let mut snapshot = WorkspaceSnapshot {
            tasks: (0..200)
                .map(|i| json!({"id": format!("t{i}"), "title": "A task with a long title"}))
                .collect(),
            ..Default::default()
        };

        let redacted = snapshot.enforce_budget(256);
        assert!(redacted);
        assert!(snapshot.tasks.is_empty());
        assert!(snapshot.goals.is_empty());
        assert!(snapshot.redacted);
        assert_eq!(snapshot.annotations, vec!["budget_exceeded"]);
    }

    #[test]
    fn under_budget_snapshot_is_untouched() {
        let mut snapshot = WorkspaceSnapshot {
            goals: vec![json!({"id": "g1"})],
            ..Default::default()
        };
        assert!(!snapshot.enforce_budget(1024 * 1024));
        assert_eq!(snapshot.counts().goals, 1);
        assert!(!snapshot.redacted);
    }
}

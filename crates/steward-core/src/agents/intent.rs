//! Pluggable intent classification.
//!
//! The exact classification boundary is language- and domain-specific, so it
//! sits behind one trait; the default is a deterministic keyword classifier.

use crate::knowledge::retrieval::tokenize;

/// Coarse intent of a user request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Asks about live business state (goals, tasks, projects).
    WorkspaceQuery,
    /// Asks about process/policy knowledge.
    KnowledgeQuery,
    /// Asks for a side-effecting change.
    WriteRequest,
    /// Anything else.
    SmallTalk,
}

impl Intent {
    /// Whether answering requires grounded facts rather than conversation.
    pub fn is_fact_sensitive(self) -> bool {
        matches!(self, Intent::WorkspaceQuery | Intent::KnowledgeQuery)
    }
}

pub trait IntentClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Intent;
}

/// Default keyword classifier. Word lists are data, not contract; swap the
/// whole classifier for other languages or domains.
pub struct KeywordIntentClassifier {
    write_markers: Vec<&'static str>,
    workspace_markers: Vec<&'static str>,
    knowledge_markers: Vec<&'static str>,
}

impl Default for KeywordIntentClassifier {
    fn default() -> Self {
        Self {
            write_markers: vec![
                "create", "add", "update", "delete", "remove", "complete", "finish", "assign",
                "schedule", "rename", "archive",
            ],
            workspace_markers: vec![
                "goal", "goals", "task", "tasks", "project", "projects", "status", "progress",
                "deadline", "record", "records", "backlog",
            ],
            knowledge_markers: vec![
                "how", "why", "policy", "process", "playbook", "rule", "rules", "guide",
                "procedure", "convention",
            ],
        }
    }
}

impl IntentClassifier for KeywordIntentClassifier {
    fn classify(&self, text: &str) -> Intent {
        let tokens = tokenize(text);
        let hits = |markers: &[&str]| markers.iter().any(|m| tokens.contains(*m));

        if hits(&self.write_markers) {
            Intent::WriteRequest
        } else if hits(&self.workspace_markers) {
            Intent::WorkspaceQuery
        } else if hits(&self.knowledge_markers) {
            Intent::KnowledgeQuery
        } else {
            Intent::SmallTalk
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_samples() {
        let classifier = KeywordIntentClassifier::default();
        assert_eq!(
            classifier.classify("create a task for the launch"),
            Intent::WriteRequest
        );
        assert_eq!(
            classifier.classify("what is the status of our goals?"),
            Intent::WorkspaceQuery
        );
        assert_eq!(
            classifier.classify("how does the escalation process work"),
            Intent::KnowledgeQuery
        );
        assert_eq!(classifier.classify("good morning!"), Intent::SmallTalk);
    }

    #[test]
    fn write_markers_win_over_workspace_markers() {
        let classifier = KeywordIntentClassifier::default();
        assert_eq!(
            classifier.classify("update the task deadline"),
            Intent::WriteRequest
        );
    }

    #[test]
    fn fact_sensitivity() {
        assert!(Intent::WorkspaceQuery.is_fact_sensitive());
        assert!(Intent::KnowledgeQuery.is_fact_sensitive());
        assert!(!Intent::WriteRequest.is_fact_sensitive());
        assert!(!Intent::SmallTalk.is_fact_sensitive());
    }
}

//! Grounding pack assembly.
//!
//! The builder enforces its own byte and latency budgets independently of
//! any outer request timeout, and records every consulted or skipped source
//! in the pack trace.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

use super::identity::IdentityProvider;
use super::pack::{
    Diagnostics, GroundingPack, KbRetrieved, PackTrace, RecommendedAction, SectionPack,
};
use super::snapshot::WorkspaceSnapshot;
use crate::agents::intent::{Intent, IntentClassifier};
use crate::config::CoreConfig;
use crate::knowledge::KnowledgeService;

/// Budgets the builder enforces on its own.
#[derive(Debug, Clone)]
pub struct GroundingConfig {
    /// Byte budget for the workspace snapshot section.
    pub max_snapshot_bytes: usize,
    /// Max targeted workspace reads per build; zero disables targeted reads.
    pub max_calls: usize,
    /// Latency budget for the knowledge load.
    pub fetch_timeout: Duration,
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            max_snapshot_bytes: 48 * 1024,
            max_calls: 4,
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

impl GroundingConfig {
    pub fn from_core(config: &CoreConfig) -> Self {
        Self {
            max_snapshot_bytes: config.snapshot_max_bytes,
            max_calls: config.snapshot_max_calls,
            ..Default::default()
        }
    }
}

pub struct GroundingBuilder {
    knowledge: Arc<KnowledgeService>,
    identity: Arc<dyn IdentityProvider>,
    classifier: Arc<dyn IntentClassifier>,
    config: GroundingConfig,
}

impl GroundingBuilder {
    pub fn new(
        knowledge: Arc<KnowledgeService>,
        identity: Arc<dyn IdentityProvider>,
        classifier: Arc<dyn IntentClassifier>,
        config: GroundingConfig,
    ) -> Self {
        Self {
            knowledge,
            identity,
            classifier,
            config,
        }
    }

    /// Assemble the bounded context bundle for one turn.
    pub async fn build(
        &self,
        prompt: &str,
        external_snapshot: Option<&Value>,
        memory_snapshot: Option<Value>,
    ) -> GroundingPack {
        let intent = self.classifier.classify(prompt);
        let mut trace = PackTrace::default();
        let mut missing_keys = Vec::new();

        // Identity: partial failure is recorded, never fatal and never
        // blocking on its own.
        let identity = self.identity.load();
        let identity_pack = if identity.is_empty() {
            missing_keys.push("identity_unavailable".to_string());
            trace.skipped("identity", "no identity sections available");
            SectionPack::empty()
        } else {
            for section in &identity.missing {
                missing_keys.push(format!("identity.{section}"));
            }
            trace.used("identity");
            SectionPack::new(json!(identity.sections))
        };

        // Knowledge: one load (hashed, under the builder's own latency
        // budget), then retrieval against it.
        let kb_retrieved = match tokio::time::timeout(
            self.config.fetch_timeout,
            self.knowledge.entries(),
        )
        .await
        {
            Ok(Ok(entries)) => {
                let meta = self.knowledge.meta();
                trace.kb_source = meta.source.clone();
                trace.kb_cache_hit = meta.cache_hit;
                trace.used("knowledge");

                if entries.is_empty() {
                    missing_keys.push("kb_empty".to_string());
                }
                if intent == Intent::WorkspaceQuery && !has_workspace_guide(&entries) {
                    missing_keys.push("kb_workspace_guide_missing".to_string());
                }

                let retrieval = crate::knowledge::retrieval::rank(
                    &entries,
                    prompt,
                    self.knowledge.top_k(),
                    &meta.source,
                    meta.cache_hit,
                );
                KbRetrieved {
                    hash: super::pack::content_hash(&json!(*entries)),
                    used_entry_ids: retrieval.selected_ids,
                    entries: retrieval.entries,
                }
            }
            Ok(Err(e)) => {
                missing_keys.push("kb_unavailable".to_string());
                trace.skipped("knowledge", &e.to_string());
                KbRetrieved::default()
            }
            Err(_) => {
                missing_keys.push("kb_timeout".to_string());
                trace.skipped("knowledge", "knowledge fetch exceeded the latency budget");
                KbRetrieved::default()
            }
        };

        // Workspace snapshot, only for prompts that need live state.
        let mut snapshot = WorkspaceSnapshot::default();
        match intent {
            Intent::SmallTalk => {
                trace.skipped("workspace_snapshot", "not required for prompt");
            }
            Intent::KnowledgeQuery => {
                trace.skipped("workspace_snapshot", "kb-only question");
            }
            Intent::WorkspaceQuery | Intent::WriteRequest => match external_snapshot {
                Some(value) => {
                    snapshot = WorkspaceSnapshot::from_provider_value(value);
                    trace.used("workspace_snapshot");
                }
                None => {
                    missing_keys.push("workspace_snapshot_unavailable".to_string());
                    trace.skipped("workspace_snapshot", "snapshot provider returned nothing");
                }
            },
        }
        if self.config.max_calls == 0 {
            trace.skipped("targeted_reads", "targeted reads disabled");
        }

        let counts = snapshot.counts();
        if snapshot.enforce_budget(self.config.max_snapshot_bytes) {
            trace.budget_exceeded = true;
        }

        // Short-term memory.
        let memory_items = memory_snapshot.as_ref().map(count_items).unwrap_or(0);
        let memory_pack = match memory_snapshot {
            Some(value) => {
                trace.used("memory");
                SectionPack::new(value)
            }
            None => {
                trace.skipped("memory", "no short-term memory for conversation");
                SectionPack::empty()
            }
        };

        // A fact-sensitive prompt with required (non-identity) grounding
        // absent blocks the completion call entirely.
        let blocked = intent.is_fact_sensitive()
            && missing_keys.iter().any(|k| !k.starts_with("identity"));
        let recommended_action = if blocked {
            RecommendedAction::CannotAnswer
        } else {
            RecommendedAction::Proceed
        };

        debug!(
            ?intent,
            missing = missing_keys.len(),
            blocked,
            "grounding pack assembled"
        );

        GroundingPack {
            identity_pack,
            kb_retrieved,
            notion_snapshot: snapshot,
            memory_snapshot: memory_pack,
            diagnostics: Diagnostics {
                missing_keys,
                recommended_action,
                counts,
                memory_items,
            },
            trace,
        }
    }

}

/// Workspace-state questions need the workspace operations guide somewhere
/// in the loaded knowledge set.
fn has_workspace_guide(entries: &[crate::knowledge::KnowledgeEntry]) -> bool {
    entries
        .iter()
        .any(|e| e.applies_to.iter().any(|scope| scope == "workspace"))
}

fn count_items(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.len(),
        Value::Object(map) => map
            .get("items")
            .and_then(Value::as_array)
            .map(|items| items.len())
            .unwrap_or(map.len()),
        Value::Null => 0,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::intent::KeywordIntentClassifier;
    use crate::grounding::identity::StaticIdentityProvider;
    use crate::knowledge::testing::CountingSource;
    use crate::knowledge::{KnowledgeCache, KnowledgeEntry, KnowledgeService};
    use std::collections::BTreeMap;

    fn kb_entry(id: &str, content: &str, applies_to: &[&str]) -> KnowledgeEntry {
        KnowledgeEntry {
            id: id.to_string(),
            title: id.to_string(),
            tags: Vec::new(),
            applies_to: applies_to.iter().map(|s| s.to_string()).collect(),
            priority: 0.5,
            content: content.to_string(),
            updated_at: None,
        }
    }

    fn identity() -> Arc<StaticIdentityProvider> {
        let mut sections = BTreeMap::new();
        sections.insert("persona".to_string(), "ops steward".to_string());
        Arc::new(StaticIdentityProvider::new(sections))
    }

    fn builder_with(entries: Vec<KnowledgeEntry>, config: GroundingConfig) -> GroundingBuilder {
        let source = Arc::new(CountingSource::ok("file", entries));
        let service = Arc::new(KnowledgeService::new(
            KnowledgeCache::new(source, Duration::from_secs(60)),
            6,
        ));
        GroundingBuilder::new(
            service,
            identity(),
            Arc::new(KeywordIntentClassifier::default()),
            config,
        )
    }

    #[tokio::test]
    async fn over_budget_snapshot_is_redacted_not_truncated() {
        let builder = builder_with(
            vec![kb_entry("kb-ws", "goal task project status guide", &["workspace"])],
            GroundingConfig {
                max_snapshot_bytes: 128,
                ..Default::default()
            },
        );

        let big: Vec<Value> = (0..100)
            .map(|i| json!({"id": format!("t{i}"), "title": "a reasonably long task title"}))
            .collect();
        let snapshot = json!({"payload": {"tasks": big}});

        let pack = builder
            .build("what is the status of our tasks", Some(&snapshot), None)
            .await;

        assert!(pack.trace.budget_exceeded);
        assert!(pack.notion_snapshot.redacted);
        assert!(pack.notion_snapshot.tasks.is_empty());
        assert_eq!(pack.notion_snapshot.annotations, vec!["budget_exceeded"]);
        // Counts reflect what the provider sent before redaction.
        assert_eq!(pack.diagnostics.counts.tasks, 100);
    }

    #[tokio::test]
    async fn kb_only_question_skips_the_snapshot_with_reason() {
        let builder = builder_with(
            vec![kb_entry("kb-esc", "escalation policy process", &[])],
            GroundingConfig::default(),
        );

        let pack = builder
            .build("how does the escalation policy work", None, None)
            .await;

        assert!(pack.can_proceed());
        assert!(pack
            .trace
            .not_used
            .iter()
            .any(|s| s.source == "workspace_snapshot" && s.reason == "kb-only question"));
        assert_eq!(pack.kb_retrieved.used_entry_ids, vec!["kb-esc"]);
    }

    #[tokio::test]
    async fn small_talk_skips_the_snapshot_as_not_required() {
        let builder = builder_with(Vec::new(), GroundingConfig::default());
        let pack = builder.build("good morning", None, None).await;
        assert!(pack.can_proceed());
        assert!(pack
            .trace
            .not_used
            .iter()
            .any(|s| s.source == "workspace_snapshot" && s.reason == "not required for prompt"));
    }

    #[tokio::test]
    async fn empty_knowledge_blocks_a_fact_sensitive_query() {
        let builder = builder_with(Vec::new(), GroundingConfig::default());
        let pack = builder
            .build("how does the escalation policy work", None, None)
            .await;

        assert!(!pack.can_proceed());
        assert!(pack
            .diagnostics
            .missing_keys
            .contains(&"kb_empty".to_string()));
    }

    #[tokio::test]
    async fn missing_workspace_guide_is_flagged_for_workspace_queries() {
        let builder = builder_with(
            vec![kb_entry("kb-hr", "vacation policy", &["hr"])],
            GroundingConfig::default(),
        );
        let snapshot = json!({"payload": {"goals": [{"id": "g1"}]}});
        let pack = builder
            .build("what is the progress on our goals", Some(&snapshot), None)
            .await;

        assert!(pack
            .diagnostics
            .missing_keys
            .contains(&"kb_workspace_guide_missing".to_string()));
        assert!(!pack.can_proceed());
    }

    #[tokio::test]
    async fn missing_identity_sections_do_not_block() {
        let source = Arc::new(CountingSource::ok(
            "file",
            vec![kb_entry("kb-ws", "goal status guide", &["workspace"])],
        ));
        let service = Arc::new(KnowledgeService::new(
            KnowledgeCache::new(source, Duration::from_secs(60)),
            6,
        ));
        let builder = GroundingBuilder::new(
            service,
            Arc::new(StaticIdentityProvider::default()),
            Arc::new(KeywordIntentClassifier::default()),
            GroundingConfig::default(),
        );

        let snapshot = json!({"goals": [{"id": "g1"}]});
        let pack = builder
            .build("what is the status of our goals", Some(&snapshot), None)
            .await;

        assert!(pack
            .diagnostics
            .missing_keys
            .contains(&"identity_unavailable".to_string()));
        assert!(pack.can_proceed());
    }

    #[tokio::test]
    async fn trace_records_used_sources_and_memory() {
        let builder = builder_with(
            vec![kb_entry("kb-ws", "goal status guide", &["workspace"])],
            GroundingConfig::default(),
        );
        let snapshot = json!({"goals": [{"id": "g1"}]});
        let memory = json!({"items": [{"note": "user prefers Mondays"}]});

        let pack = builder
            .build("what is the status of our goals", Some(&snapshot), Some(memory))
            .await;

        assert!(pack.trace.used_sources.contains(&"identity".to_string()));
        assert!(pack.trace.used_sources.contains(&"knowledge".to_string()));
        assert!(pack
            .trace
            .used_sources
            .contains(&"workspace_snapshot".to_string()));
        assert!(pack.trace.used_sources.contains(&"memory".to_string()));
        assert_eq!(pack.diagnostics.memory_items, 1);
    }

    #[tokio::test]
    async fn disabled_targeted_reads_are_traced() {
        let builder = builder_with(
            Vec::new(),
            GroundingConfig {
                max_calls: 0,
                ..Default::default()
            },
        );
        let pack = builder.build("hello there", None, None).await;
        assert!(pack
            .trace
            .not_used
            .iter()
            .any(|s| s.source == "targeted_reads" && s.reason == "targeted reads disabled"));
    }
}

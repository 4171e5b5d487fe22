//! Agent registry: the single source of truth for which agents exist and
//! are enabled, plus the compile-time handler map they dispatch to.
//!
//! The registry document supplies metadata only (priority, keywords,
//! enabled); handlers are registered in code against entrypoint names.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::descriptor::{load_descriptors, AgentDescriptor, DescriptorLoad};
use super::types::{AgentInput, AgentOutput};
use crate::error::DispatchError;

/// A concrete agent handler.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn route(&self, input: AgentInput) -> Result<AgentOutput, DispatchError>;
}

#[derive(Default)]
struct Inner {
    descriptors: BTreeMap<String, AgentDescriptor>,
    handlers: HashMap<String, Arc<dyn Agent>>,
}

/// Registry of agent descriptors and their handlers.
#[derive(Default)]
pub struct AgentRegistry {
    inner: RwLock<Inner>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under an entrypoint name. Descriptors reference
    /// handlers by this name.
    pub fn register_handler(&self, entrypoint: &str, handler: Arc<dyn Agent>) {
        self.inner
            .write()
            .handlers
            .insert(entrypoint.to_string(), handler);
    }

    /// Register a single descriptor. Idempotent: an existing id is replaced,
    /// never merged.
    pub fn register(&self, descriptor: AgentDescriptor) {
        let mut inner = self.inner.write();
        if inner.descriptors.insert(descriptor.id.clone(), descriptor).is_some() {
            debug!("replaced existing agent descriptor");
        }
    }

    /// Load a registry document, replacing the descriptor set wholesale.
    /// Bad entries are skipped (reported in the returned load), never fatal.
    pub fn load_document(&self, document: &serde_json::Value) -> DescriptorLoad {
        let load = load_descriptors(document);

        let mut inner = self.inner.write();
        inner.descriptors.clear();
        for descriptor in &load.descriptors {
            inner
                .descriptors
                .insert(descriptor.id.clone(), descriptor.clone());
        }

        info!(
            loaded = load.descriptors.len(),
            skipped = load.skipped.len(),
            "agent registry loaded"
        );
        load
    }

    /// List descriptors, ordered by id for determinism.
    pub fn list_agents(&self, enabled_only: bool) -> Vec<AgentDescriptor> {
        self.inner
            .read()
            .descriptors
            .values()
            .filter(|d| !enabled_only || d.enabled)
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<AgentDescriptor> {
        self.inner.read().descriptors.get(id).cloned()
    }

    /// Resolve the handler a descriptor dispatches to.
    pub fn handler_for(&self, descriptor: &AgentDescriptor) -> Option<Arc<dyn Agent>> {
        self.inner.read().handlers.get(&descriptor.entrypoint).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoAgent;

    #[async_trait]
    impl Agent for EchoAgent {
        async fn route(&self, input: AgentInput) -> Result<AgentOutput, DispatchError> {
            Ok(AgentOutput::reply(input.text))
        }
    }

    fn descriptor(id: &str, enabled: bool) -> AgentDescriptor {
        AgentDescriptor {
            id: id.to_string(),
            name: id.to_string(),
            capabilities: Vec::new(),
            priority: 0,
            keywords: Vec::new(),
            entrypoint: "echo".to_string(),
            enabled,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn register_replaces_by_id() {
        let registry = AgentRegistry::new();
        registry.register(descriptor("a", true));

        let mut replacement = descriptor("a", true);
        replacement.priority = 9;
        registry.register(replacement);

        assert_eq!(registry.list_agents(false).len(), 1);
        assert_eq!(registry.get("a").unwrap().priority, 9);
    }

    #[test]
    fn enabled_only_listing_excludes_disabled() {
        let registry = AgentRegistry::new();
        registry.register(descriptor("a", true));
        registry.register(descriptor("b", false));

        assert_eq!(registry.list_agents(false).len(), 2);
        let enabled = registry.list_agents(true);
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id, "a");
    }

    #[test]
    fn load_document_replaces_wholesale() {
        let registry = AgentRegistry::new();
        registry.register(descriptor("stale", true));

        let load = registry.load_document(&json!({
            "fresh": {"entrypoint": "echo", "keywords": ["hello"]}
        }));
        assert_eq!(load.descriptors.len(), 1);
        assert!(registry.get("stale").is_none());
        assert!(registry.get("fresh").is_some());
    }

    #[tokio::test]
    async fn handler_resolution_uses_the_entrypoint() {
        let registry = AgentRegistry::new();
        registry.register_handler("echo", Arc::new(EchoAgent));
        registry.register(descriptor("a", true));

        let desc = registry.get("a").unwrap();
        let handler = registry.handler_for(&desc).unwrap();
        let output = handler.route(AgentInput::new("hi")).await.unwrap();
        assert_eq!(output.text, "hi");

        let mut orphan = descriptor("b", true);
        orphan.entrypoint = "missing".to_string();
        assert!(registry.handler_for(&orphan).is_none());
    }
}

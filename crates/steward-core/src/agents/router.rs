//! Deterministic agent selection and dispatch.
//!
//! Selection is a pure function of registry state and request content:
//! preferred id (if enabled) wins, otherwise keyword scoring ordered by
//! `(-matches, -priority, id)`. Dispatch errors never escape the router;
//! they become degraded outputs with the error in trace.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::descriptor::AgentDescriptor;
use super::registry::AgentRegistry;
use super::types::{AgentInput, AgentOutput, ProposalStatus, ProposedCommand, SelectionMethod};
use crate::error::DispatchError;
use crate::knowledge::retrieval::tokenize;

/// Flags resolved from request metadata before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterFlags {
    pub read_only: bool,
    pub require_approval: bool,
}

impl RouterFlags {
    pub fn resolve(input: &AgentInput) -> Self {
        Self {
            read_only: input.read_only_flag(),
            require_approval: input.require_approval_flag(),
        }
    }
}

pub struct AgentRouter {
    registry: Arc<AgentRegistry>,
}

impl AgentRouter {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Route a request to the selected agent and normalize its output.
    pub async fn route(&self, input: AgentInput) -> AgentOutput {
        let flags = RouterFlags::resolve(&input);

        let Some((descriptor, selected_by)) = self.select(&input) else {
            return Self::no_agents_output(flags);
        };

        debug!(
            agent = descriptor.id.as_str(),
            selected_by = ?selected_by,
            read_only = flags.read_only,
            "routing request"
        );

        let mut dispatched = input;
        if flags.read_only {
            dispatched
                .metadata
                .insert("read_only".to_string(), Value::Bool(true));
        }

        let result = match self.registry.handler_for(&descriptor) {
            Some(handler) => handler.route(dispatched).await,
            None => Err(DispatchError::MissingTarget {
                agent_id: descriptor.id.clone(),
                entrypoint: descriptor.entrypoint.clone(),
            }),
        };

        let output = match result {
            Ok(output) => output,
            Err(err) => Self::degraded_output(&descriptor, &err),
        };

        Self::normalize(output, &descriptor.id, selected_by, flags)
    }

    /// Selection: preferred id short-circuit, then keyword scoring over all
    /// enabled agents. A disabled preferred agent falls through to scoring.
    fn select(&self, input: &AgentInput) -> Option<(AgentDescriptor, SelectionMethod)> {
        if let Some(preferred) = &input.preferred_agent_id {
            match self.registry.get(preferred) {
                Some(descriptor) if descriptor.enabled => {
                    return Some((descriptor, SelectionMethod::PreferredAgentId));
                }
                Some(_) => {
                    debug!(agent = preferred.as_str(), "preferred agent disabled, scoring instead")
                }
                None => {
                    debug!(agent = preferred.as_str(), "preferred agent unknown, scoring instead")
                }
            }
        }

        let candidates = self.registry.list_agents(true);
        if candidates.is_empty() {
            return None;
        }

        let text_lower = input.text.to_lowercase();
        let tokens = tokenize(&input.text);

        let mut scored: Vec<(usize, &AgentDescriptor)> = candidates
            .iter()
            .map(|descriptor| {
                let matches = descriptor
                    .keywords
                    .iter()
                    .filter(|keyword| {
                        let keyword = keyword.to_lowercase();
                        tokens.contains(&keyword) || text_lower.contains(&keyword)
                    })
                    .count();
                (matches, descriptor)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| b.1.priority.cmp(&a.1.priority))
                .then_with(|| a.1.id.cmp(&b.1.id))
        });

        let winner = scored[0].1.clone();
        Some((winner, SelectionMethod::KeywordScore))
    }

    /// Deterministic output when no agents are enabled at all.
    fn no_agents_output(flags: RouterFlags) -> AgentOutput {
        AgentOutput {
            agent_id: "none".to_string(),
            text: "No agents are available to handle this request.".to_string(),
            proposals: Vec::new(),
            read_only: flags.read_only,
            selected_by: SelectionMethod::NoAgentsAvailable,
            trace: vec!["no enabled agents in registry".to_string()],
        }
    }

    /// The single conversion point from a dispatch error to a degraded
    /// output. The router never propagates an error to its caller.
    fn degraded_output(descriptor: &AgentDescriptor, err: &DispatchError) -> AgentOutput {
        warn!(agent = descriptor.id.as_str(), error = %err, "agent dispatch degraded");
        AgentOutput {
            agent_id: descriptor.id.clone(),
            text: format!(
                "The {} agent could not process this request.",
                descriptor.name
            ),
            proposals: Vec::new(),
            read_only: true,
            selected_by: SelectionMethod::KeywordScore,
            trace: vec![format!("dispatch_error: {err}")],
        }
    }

    /// Post-dispatch normalization: the router owns `agent_id`,
    /// `read_only`, and the proposal safety fields, regardless of what the
    /// handler claimed.
    fn normalize(
        mut output: AgentOutput,
        agent_id: &str,
        selected_by: SelectionMethod,
        flags: RouterFlags,
    ) -> AgentOutput {
        output.agent_id = agent_id.to_string();
        output.read_only = flags.read_only;
        output.selected_by = selected_by;
        for proposal in &mut output.proposals {
            normalize_proposal(proposal, flags);
        }
        output
    }
}

/// Force the safety posture onto one proposal.
///
/// Read-only sessions block everything; otherwise a proposal that requests
/// approval stays dry-run/blocked until approved, and only approval-exempt
/// proposals may come out ready.
pub fn normalize_proposal(proposal: &mut ProposedCommand, flags: RouterFlags) {
    if flags.read_only {
        proposal.dry_run = true;
        proposal.approved = false;
        proposal.execute = false;
        proposal.status = ProposalStatus::Blocked;
    } else if flags.require_approval && proposal.requires_approval {
        proposal.dry_run = true;
        proposal.approved = false;
        proposal.execute = false;
        proposal.status = ProposalStatus::Blocked;
    } else {
        proposal.status = ProposalStatus::Ready;
    }
}

//! Shared agent I/O types: inputs, outputs, and proposed commands.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::grounding::GroundingPack;

fn default_true() -> bool {
    true
}

/// Risk tier of a proposed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    #[default]
    Low,
    Medium,
    High,
}

/// Lifecycle status of a proposal after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    /// As emitted by the agent, before the router has normalized it.
    #[default]
    Proposed,
    /// Held behind the approval gate; will not run as-is.
    Blocked,
    /// Cleared to run without a further approval step.
    Ready,
}

/// How the router picked the handling agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    PreferredAgentId,
    #[default]
    KeywordScore,
    NoAgentsAvailable,
}

/// One candidate side-effecting action. Never executed directly; always
/// routed through the approval gate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProposedCommand {
    /// Namespaced command name, e.g. `workspace.create_record` or
    /// `memory.append`.
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default)]
    pub args: serde_json::Map<String, Value>,
    /// Human-readable justification shown alongside the proposal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub risk: RiskTier,
    #[serde(default = "default_true")]
    pub requires_approval: bool,
    #[serde(default = "default_true")]
    pub dry_run: bool,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub execute: bool,
    #[serde(default)]
    pub status: ProposalStatus,
    /// Assigned by the gate when the proposal surfaces for approval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<String>,
}

impl ProposedCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            intent: None,
            args: serde_json::Map::new(),
            reason: None,
            risk: RiskTier::Low,
            requires_approval: true,
            dry_run: true,
            approved: false,
            execute: false,
            status: ProposalStatus::Proposed,
            approval_id: None,
        }
    }

    pub fn with_arg(mut self, key: &str, value: Value) -> Self {
        self.args.insert(key.to_string(), value);
        self
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_risk(mut self, risk: RiskTier) -> Self {
        self.risk = risk;
        self
    }

    /// Whether this command writes to the external workspace (as opposed to
    /// a non-workspace side effect such as a memory write).
    pub fn targets_workspace(&self) -> bool {
        self.command.starts_with("workspace.")
    }

    /// Deterministic content-derived key. Approving the same proposal twice
    /// is a no-op on the second approval because this key is stable across
    /// surfacing, replay, and normalization.
    pub fn idempotency_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.command.as_bytes());
        hasher.update([0]);
        hasher.update(self.intent.as_deref().unwrap_or_default().as_bytes());
        hasher.update([0]);
        hasher.update(Value::Object(self.args.clone()).to_string().as_bytes());
        to_hex(&hasher.finalize())
    }
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    const HEX: &[u8; 16] = b"0123456789abcdef";
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

/// One routed request as seen by an agent handler.
#[derive(Debug, Clone, Default)]
pub struct AgentInput {
    pub text: String,
    pub session_id: String,
    pub conversation_id: String,
    pub preferred_agent_id: Option<String>,
    /// Free-form request metadata; the router reads `read_only` and
    /// `require_approval` from here (both default true).
    pub metadata: serde_json::Map<String, Value>,
    /// Context bundle attached by the service before dispatch.
    pub grounding: Option<Arc<GroundingPack>>,
}

impl AgentInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    fn bool_flag(&self, key: &str) -> bool {
        self.metadata
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    /// Resolved `read_only` flag; absent means true.
    pub fn read_only_flag(&self) -> bool {
        self.bool_flag("read_only")
    }

    /// Resolved `require_approval` flag; absent means true.
    pub fn require_approval_flag(&self) -> bool {
        self.bool_flag("require_approval")
    }
}

/// Agent handler result after router normalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AgentOutput {
    /// Always overwritten by the router with the selected agent's id.
    pub agent_id: String,
    pub text: String,
    #[serde(default)]
    pub proposals: Vec<ProposedCommand>,
    #[serde(default = "default_true")]
    pub read_only: bool,
    #[serde(default)]
    pub selected_by: SelectionMethod,
    #[serde(default)]
    pub trace: Vec<String>,
}

impl AgentOutput {
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            read_only: true,
            ..Default::default()
        }
    }

    pub fn with_proposal(mut self, proposal: ProposedCommand) -> Self {
        self.proposals.push(proposal);
        self
    }
}

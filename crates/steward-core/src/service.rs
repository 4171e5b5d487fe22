//! The per-turn pipeline: pending-proposal handling, grounding, routing,
//! gating, and history persistence.
//!
//! The completion service and the workspace are external collaborators; the
//! service only knows their trait boundaries.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::agents::registry::Agent;
use crate::agents::router::AgentRouter;
use crate::agents::types::{AgentInput, AgentOutput, ProposedCommand};
use crate::approval::gate::{ApprovalOutcome, ProposalGate};
use crate::approval::pending::{classify_follow_up, FollowUp};
use crate::approval::SessionArmState;
use crate::config::CoreConfig;
use crate::conversation::ConversationStore;
use crate::error::{ApprovalError, DispatchError};
use crate::grounding::builder::GroundingBuilder;
use crate::grounding::GroundingPack;

/// Upstream language-model completion collaborator: given context, returns
/// text plus structured intents.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        pack: &GroundingPack,
        prompt: &str,
    ) -> anyhow::Result<CompletionResponse>;
}

#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    pub text: String,
    pub proposals: Vec<ProposedCommand>,
}

/// External workspace read collaborator supplying the business-state
/// snapshot for grounding.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn fetch(&self) -> anyhow::Result<Value>;
}

/// Fixed snapshot, for embedding and tests.
pub struct StaticSnapshotProvider {
    value: Option<Value>,
}

impl StaticSnapshotProvider {
    pub fn new(value: Option<Value>) -> Self {
        Self { value }
    }
}

#[async_trait]
impl SnapshotProvider for StaticSnapshotProvider {
    async fn fetch(&self) -> anyhow::Result<Value> {
        self.value
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no snapshot available"))
    }
}

/// Default handler for grounded conversation: forwards the prompt and pack
/// to the completion collaborator.
pub struct GroundedCompletionAgent {
    completion: Arc<dyn CompletionClient>,
}

impl GroundedCompletionAgent {
    pub fn new(completion: Arc<dyn CompletionClient>) -> Self {
        Self { completion }
    }
}

#[async_trait]
impl Agent for GroundedCompletionAgent {
    async fn route(&self, input: AgentInput) -> Result<AgentOutput, DispatchError> {
        let Some(pack) = &input.grounding else {
            return Err(DispatchError::handler_failed(
                "assistant",
                "no grounding pack attached to input",
            ));
        };

        let response = self
            .completion
            .complete(pack, &input.text)
            .await
            .map_err(|e| DispatchError::handler_failed("assistant", e))?;

        Ok(AgentOutput {
            text: response.text,
            proposals: response.proposals,
            ..Default::default()
        })
    }
}

/// Outcome of one handled turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub reply: String,
    pub proposals: Vec<ProposedCommand>,
    pub agent_id: String,
    /// The proposals are a verbatim replay of the pending list.
    pub replayed: bool,
    /// The turn was refused for missing grounding.
    pub refusal: bool,
}

/// The assembled core service.
pub struct Steward {
    config: CoreConfig,
    router: AgentRouter,
    gate: Arc<ProposalGate>,
    store: Arc<ConversationStore>,
    grounding: Arc<GroundingBuilder>,
    snapshots: Arc<dyn SnapshotProvider>,
}

impl Steward {
    pub fn new(
        config: CoreConfig,
        router: AgentRouter,
        gate: Arc<ProposalGate>,
        store: Arc<ConversationStore>,
        grounding: Arc<GroundingBuilder>,
        snapshots: Arc<dyn SnapshotProvider>,
    ) -> Self {
        Self {
            config,
            router,
            gate,
            store,
            grounding,
            snapshots,
        }
    }

    pub fn router(&self) -> &AgentRouter {
        &self.router
    }

    pub fn gate(&self) -> &Arc<ProposalGate> {
        &self.gate
    }

    /// Arm a session for workspace writes.
    pub fn arm_session(&self, session_id: &str, justification: &str) -> SessionArmState {
        self.gate.arms().arm(session_id, justification)
    }

    /// Disarm a session.
    pub fn disarm_session(&self, session_id: &str, justification: &str) -> SessionArmState {
        self.gate.arms().disarm(session_id, justification)
    }

    /// Approve and execute a surfaced proposal.
    pub async fn approve(
        &self,
        approval_id: &str,
        approved_by: &str,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        self.gate.approve(approval_id, approved_by).await
    }

    /// Handle one inbound turn.
    pub async fn handle_turn(
        &self,
        session_id: &str,
        conversation_id: &str,
        text: &str,
        preferred_agent_id: Option<String>,
        metadata: serde_json::Map<String, Value>,
    ) -> anyhow::Result<TurnOutcome> {
        // A pending proposal intercepts short confirmations before any
        // agent or completion work happens.
        if let Some(pending) = self.gate.pending(conversation_id) {
            match classify_follow_up(text) {
                FollowUp::Confirm => {
                    info!(conversation = conversation_id, "replaying pending proposal");
                    self.gate.clear_pending(conversation_id)?;
                    let reply =
                        "Confirmed. The proposal is queued for approval as shown.".to_string();
                    self.append_turn(conversation_id, text, &reply)?;
                    return Ok(TurnOutcome {
                        reply,
                        proposals: pending.proposals,
                        agent_id: String::new(),
                        replayed: true,
                        refusal: false,
                    });
                }
                FollowUp::Cancel => {
                    info!(conversation = conversation_id, "pending proposal cancelled");
                    self.gate.clear_pending(conversation_id)?;
                    let reply = "Cancelled — nothing was executed.".to_string();
                    self.append_turn(conversation_id, text, &reply)?;
                    return Ok(TurnOutcome {
                        reply,
                        proposals: Vec::new(),
                        agent_id: String::new(),
                        replayed: false,
                        refusal: false,
                    });
                }
                FollowUp::NewTopic => {
                    debug!(conversation = conversation_id, "topic changed, clearing pending");
                    self.gate.clear_pending(conversation_id)?;
                }
            }
        }

        // Assemble grounding from memory and the live snapshot.
        let memory = self.memory_snapshot(conversation_id);
        let external = self.snapshots.fetch().await.ok();
        let pack = self.grounding.build(text, external.as_ref(), memory).await;

        if !pack.can_proceed() {
            let reply = refusal_text(&pack.diagnostics.missing_keys);
            self.append_turn(conversation_id, text, &reply)?;
            return Ok(TurnOutcome {
                reply,
                proposals: Vec::new(),
                agent_id: String::new(),
                replayed: false,
                refusal: true,
            });
        }

        let input = AgentInput {
            text: text.to_string(),
            session_id: session_id.to_string(),
            conversation_id: conversation_id.to_string(),
            preferred_agent_id,
            metadata,
            grounding: Some(Arc::new(pack)),
        };

        let output = self.router.route(input).await;
        let gated = self
            .gate
            .gate_output(session_id, conversation_id, output)?;

        self.append_turn(conversation_id, text, &gated.text)?;

        Ok(TurnOutcome {
            reply: gated.text.clone(),
            proposals: gated.proposals,
            agent_id: gated.agent_id,
            replayed: false,
            refusal: false,
        })
    }

    fn append_turn(&self, conversation_id: &str, user: &str, assistant: &str) -> anyhow::Result<()> {
        self.store.append_turn(
            conversation_id,
            user,
            assistant,
            self.config.max_turns,
            self.config.max_turn_chars,
        )
    }

    fn memory_snapshot(&self, conversation_id: &str) -> Option<Value> {
        let summary =
            self.store
                .get_summary(conversation_id, self.config.max_turns, self.config.max_turn_chars);
        if summary.turns.is_empty() {
            None
        } else {
            Some(json!({ "items": summary.turns }))
        }
    }
}

/// Canonical refusal: states what is missing in plain language, never
/// internal diagnostic vocabulary, and never a false "system down" claim.
fn refusal_text(missing_keys: &[String]) -> String {
    let mut needs: Vec<&str> = Vec::new();
    for key in missing_keys {
        let need = if key.starts_with("kb") {
            "the knowledge base"
        } else if key.starts_with("workspace_snapshot") {
            "the live workspace data"
        } else {
            continue;
        };
        if !needs.contains(&need) {
            needs.push(need);
        }
    }

    if needs.is_empty() {
        "I can't answer that reliably right now because some required context is unavailable."
            .to_string()
    } else {
        format!(
            "I can't answer that reliably right now — I'm missing {}.",
            needs.join(" and ")
        )
    }
}

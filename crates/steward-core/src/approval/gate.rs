//! The proposal/approval gate.
//!
//! Everything side-effecting flows through here: disarmed sessions have
//! their workspace proposals stripped (not merely marked blocked), surfaced
//! proposals get approval ids and pending-replay state, and approvals are
//! idempotent and re-check the arm state at execution time.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info};

use super::arm::ArmRegistry;
use super::pending::{PendingProposal, PENDING_META_KEY};
use crate::agents::types::{AgentOutput, ProposedCommand};
use crate::conversation::ConversationStore;
use crate::error::ApprovalError;

/// External collaborator that performs the actual workspace write once a
/// proposal has been approved.
#[async_trait]
pub trait WorkspaceExecutor: Send + Sync {
    async fn execute(&self, command: &ProposedCommand) -> anyhow::Result<Value>;
}

/// Result of an approval action.
#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalOutcome {
    Executed(Value),
    /// The idempotency key was already executed; the repeat approval is a
    /// no-op success.
    AlreadyExecuted,
}

struct ApprovalRecord {
    proposal: ProposedCommand,
    session_id: String,
}

pub struct ProposalGate {
    arms: Arc<ArmRegistry>,
    store: Arc<ConversationStore>,
    executor: Arc<dyn WorkspaceExecutor>,
    approvals: Mutex<HashMap<String, ApprovalRecord>>,
    executed: Mutex<HashSet<String>>,
}

impl ProposalGate {
    pub fn new(
        arms: Arc<ArmRegistry>,
        store: Arc<ConversationStore>,
        executor: Arc<dyn WorkspaceExecutor>,
    ) -> Self {
        Self {
            arms,
            store,
            executor,
            approvals: Mutex::new(HashMap::new()),
            executed: Mutex::new(HashSet::new()),
        }
    }

    pub fn arms(&self) -> &Arc<ArmRegistry> {
        &self.arms
    }

    /// Gate a routed output before it leaves the pipeline.
    ///
    /// Disarmed sessions lose their workspace-targeted proposals entirely;
    /// non-workspace side effects keep their own approval semantics. Any
    /// proposals that survive are assigned approval ids and captured as the
    /// conversation's pending proposal.
    pub fn gate_output(
        &self,
        session_id: &str,
        conversation_id: &str,
        mut output: AgentOutput,
    ) -> anyhow::Result<AgentOutput> {
        if !self.arms.is_armed(session_id) {
            let before = output.proposals.len();
            output.proposals.retain(|p| !p.targets_workspace());
            let stripped = before - output.proposals.len();
            if stripped > 0 {
                debug!(session = session_id, stripped, "stripped workspace proposals, session disarmed");
                output
                    .trace
                    .push(format!("stripped {stripped} workspace proposal(s): session disarmed"));
            }
        }

        for proposal in &mut output.proposals {
            if proposal.requires_approval && proposal.approval_id.is_none() {
                let approval_id = uuid::Uuid::new_v4().to_string();
                self.approvals.lock().insert(
                    approval_id.clone(),
                    ApprovalRecord {
                        proposal: proposal.clone(),
                        session_id: session_id.to_string(),
                    },
                );
                proposal.approval_id = Some(approval_id);
            }
        }

        if !output.proposals.is_empty() {
            self.store_pending(conversation_id, &output.proposals)?;
        }

        Ok(output)
    }

    /// The conversation's pending proposal, if any.
    pub fn pending(&self, conversation_id: &str) -> Option<PendingProposal> {
        let meta = self.store.get_meta(conversation_id);
        meta.get(PENDING_META_KEY)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Clear the pending proposal (confirm-execute, cancel, or topic change).
    pub fn clear_pending(&self, conversation_id: &str) -> anyhow::Result<()> {
        let mut updates = BTreeMap::new();
        updates.insert(PENDING_META_KEY.to_string(), Value::Null);
        self.store.update_meta(conversation_id, updates)
    }

    fn store_pending(
        &self,
        conversation_id: &str,
        proposals: &[ProposedCommand],
    ) -> anyhow::Result<()> {
        let pending = match self.pending(conversation_id) {
            // Re-surfacing the same list only bumps the prompt counter; the
            // stored list itself is opaque and never regenerated.
            Some(mut existing) if existing.proposals == proposals => {
                existing.confirm_prompts += 1;
                existing
            }
            _ => PendingProposal::new(proposals.to_vec()),
        };

        let mut updates = BTreeMap::new();
        updates.insert(PENDING_META_KEY.to_string(), serde_json::to_value(&pending)?);
        self.store.update_meta(conversation_id, updates)
    }

    /// Execute an approved proposal.
    ///
    /// Checks the arm state at execution time, not proposal time, and treats
    /// an already-executed idempotency key as a no-op success.
    pub async fn approve(
        &self,
        approval_id: &str,
        approved_by: &str,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let (proposal, session_id) = {
            let approvals = self.approvals.lock();
            let record = approvals
                .get(approval_id)
                .ok_or_else(|| ApprovalError::UnknownApproval(approval_id.to_string()))?;
            (record.proposal.clone(), record.session_id.clone())
        };

        let key = proposal.idempotency_key();
        // Reserve the key before executing so a concurrent duplicate
        // approval observes it as taken.
        if !self.executed.lock().insert(key.clone()) {
            debug!(approval_id, "approval replayed for executed key, no-op");
            return Ok(ApprovalOutcome::AlreadyExecuted);
        }

        if !self.arms.is_armed(&session_id) {
            self.executed.lock().remove(&key);
            return Err(ApprovalError::SessionDisarmed(session_id));
        }

        match self.executor.execute(&proposal).await {
            Ok(result) => {
                info!(
                    approval_id,
                    approved_by,
                    command = proposal.command.as_str(),
                    "approved proposal executed"
                );
                Ok(ApprovalOutcome::Executed(result))
            }
            Err(e) => {
                self.executed.lock().remove(&key);
                Err(ApprovalError::ExecutionFailed(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::testing::CountingExecutor;
    use serde_json::json;

    fn gate_in(dir: &tempfile::TempDir) -> (ProposalGate, Arc<CountingExecutor>) {
        let arms = Arc::new(ArmRegistry::new());
        let store =
            Arc::new(ConversationStore::open(dir.path().join("state.json")).unwrap());
        let executor = Arc::new(CountingExecutor::default());
        (ProposalGate::new(arms, store, executor.clone()), executor)
    }

    fn workspace_proposal(title: &str) -> ProposedCommand {
        ProposedCommand::new("workspace.create_record").with_arg("title", json!(title))
    }

    #[test]
    fn disarmed_session_strips_workspace_proposals_entirely() {
        let dir = tempfile::tempdir().unwrap();
        let (gate, _) = gate_in(&dir);

        let mut memory = ProposedCommand::new("memory.append");
        memory.requires_approval = false;
        let output = AgentOutput::reply("ok")
            .with_proposal(workspace_proposal("t1"))
            .with_proposal(memory.clone());

        let gated = gate.gate_output("s1", "c1", output).unwrap();
        assert_eq!(gated.proposals.len(), 1);
        assert_eq!(gated.proposals[0].command, "memory.append");
        assert!(gated.trace.iter().any(|t| t.contains("session disarmed")));
    }

    #[test]
    fn armed_session_keeps_proposals_and_assigns_approval_ids() {
        let dir = tempfile::tempdir().unwrap();
        let (gate, _) = gate_in(&dir);
        gate.arms().arm("s1", "test");

        let output = AgentOutput::reply("ok").with_proposal(workspace_proposal("t1"));
        let gated = gate.gate_output("s1", "c1", output).unwrap();
        assert_eq!(gated.proposals.len(), 1);
        assert!(gated.proposals[0].approval_id.is_some());

        let pending = gate.pending("c1").unwrap();
        assert_eq!(pending.proposals, gated.proposals);
        assert_eq!(pending.confirm_prompts, 1);
    }

    #[test]
    fn resurfacing_the_same_list_bumps_the_prompt_counter() {
        let dir = tempfile::tempdir().unwrap();
        let (gate, _) = gate_in(&dir);
        gate.arms().arm("s1", "test");

        let output = AgentOutput::reply("ok").with_proposal(workspace_proposal("t1"));
        let gated = gate.gate_output("s1", "c1", output).unwrap();

        // Same exact surfaced list again (e.g. the user asked to re-show it).
        let again = AgentOutput {
            proposals: gated.proposals.clone(),
            ..AgentOutput::reply("ok")
        };
        let _ = gate.gate_output("s1", "c1", again).unwrap();

        assert_eq!(gate.pending("c1").unwrap().confirm_prompts, 2);
    }

    #[tokio::test]
    async fn approve_executes_once_and_replays_as_noop() {
        let dir = tempfile::tempdir().unwrap();
        let (gate, executor) = gate_in(&dir);
        gate.arms().arm("s1", "test");

        let output = AgentOutput::reply("ok").with_proposal(workspace_proposal("t1"));
        let gated = gate.gate_output("s1", "c1", output).unwrap();
        let approval_id = gated.proposals[0].approval_id.clone().unwrap();

        let first = gate.approve(&approval_id, "alex").await.unwrap();
        assert!(matches!(first, ApprovalOutcome::Executed(_)));

        let second = gate.approve(&approval_id, "alex").await.unwrap();
        assert_eq!(second, ApprovalOutcome::AlreadyExecuted);
        assert_eq!(executor.calls(), 1);
    }

    #[tokio::test]
    async fn approve_rechecks_arm_state_at_execution_time() {
        let dir = tempfile::tempdir().unwrap();
        let (gate, executor) = gate_in(&dir);
        gate.arms().arm("s1", "test");

        let output = AgentOutput::reply("ok").with_proposal(workspace_proposal("t1"));
        let gated = gate.gate_output("s1", "c1", output).unwrap();
        let approval_id = gated.proposals[0].approval_id.clone().unwrap();

        // Armed at proposal time, disarmed before approval.
        gate.arms().disarm("s1", "changed my mind");
        let err = gate.approve(&approval_id, "alex").await.unwrap_err();
        assert_eq!(err, ApprovalError::SessionDisarmed("s1".to_string()));
        assert_eq!(executor.calls(), 0);

        // Re-arming makes the same approval executable; the failed attempt
        // did not burn the idempotency key.
        gate.arms().arm("s1", "ok go");
        let outcome = gate.approve(&approval_id, "alex").await.unwrap();
        assert!(matches!(outcome, ApprovalOutcome::Executed(_)));
    }

    #[tokio::test]
    async fn unknown_approval_id_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (gate, _) = gate_in(&dir);
        let err = gate.approve("ap-missing", "alex").await.unwrap_err();
        assert_eq!(err, ApprovalError::UnknownApproval("ap-missing".to_string()));
    }

    #[tokio::test]
    async fn failed_execution_releases_the_idempotency_key() {
        let dir = tempfile::tempdir().unwrap();
        let arms = Arc::new(ArmRegistry::new());
        let store =
            Arc::new(ConversationStore::open(dir.path().join("state.json")).unwrap());
        let executor = Arc::new(CountingExecutor::failing());
        let gate = ProposalGate::new(arms, store, executor.clone());
        gate.arms().arm("s1", "test");

        let output = AgentOutput::reply("ok").with_proposal(workspace_proposal("t1"));
        let gated = gate.gate_output("s1", "c1", output).unwrap();
        let approval_id = gated.proposals[0].approval_id.clone().unwrap();

        let err = gate.approve(&approval_id, "alex").await.unwrap_err();
        assert!(matches!(err, ApprovalError::ExecutionFailed(_)));

        executor.set_fail(false);
        let outcome = gate.approve(&approval_id, "alex").await.unwrap();
        assert!(matches!(outcome, ApprovalOutcome::Executed(_)));
        assert_eq!(executor.calls(), 2);
    }
}

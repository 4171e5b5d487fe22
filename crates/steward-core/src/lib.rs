//! Steward core: agent selection, knowledge grounding, and approval-gated
//! workspace writes for a conversational operations assistant.
//!
//! The pipeline per turn:
//! 1. a pending proposal intercepts short confirmations (verbatim replay,
//!    no regeneration);
//! 2. a bounded, hashed, budget-checked grounding pack is assembled from
//!    cached knowledge, identity, short-term memory, and a live workspace
//!    snapshot;
//! 3. the router deterministically selects an agent and normalizes its
//!    output;
//! 4. the approval gate strips disarmed workspace writes and turns the rest
//!    into idempotent, approval-gated proposals.
//!
//! No side-effecting action ever executes without an explicit, session-scoped
//! arm + approve step.

pub mod agents;
pub mod approval;
pub mod config;
pub mod conversation;
pub mod error;
pub mod grounding;
pub mod knowledge;
pub mod service;

pub use agents::{
    Agent, AgentDescriptor, AgentInput, AgentOutput, AgentRegistry, AgentRouter, Intent,
    IntentClassifier, KeywordIntentClassifier, ProposalStatus, ProposedCommand, RiskTier,
    SelectionMethod,
};
pub use approval::{
    ApprovalOutcome, ArmRegistry, FollowUp, PendingProposal, ProposalGate, SessionArmState,
    WorkspaceExecutor,
};
pub use config::{CoreConfig, KnowledgeSourceKind};
pub use conversation::{ConversationStore, ConversationSummary, ConversationTurn};
pub use error::{ApprovalError, DispatchError, KnowledgeError};
pub use grounding::{
    GroundingBuilder, GroundingConfig, GroundingPack, IdentityProvider, RecommendedAction,
    WorkspaceSnapshot,
};
pub use knowledge::{
    FileKnowledgeSource, KnowledgeCache, KnowledgeEntry, KnowledgeService, KnowledgeSource,
    RetrievalResult, SourceMeta,
};
pub use service::{
    CompletionClient, CompletionResponse, GroundedCompletionAgent, SnapshotProvider,
    StaticSnapshotProvider, Steward, TurnOutcome,
};

//! Agent directory, selection, and dispatch.

pub mod descriptor;
pub mod intent;
pub mod registry;
pub mod router;
pub mod types;

pub use descriptor::{load_descriptors, AgentDescriptor, DescriptorLoad, SkippedDescriptor};
pub use intent::{Intent, IntentClassifier, KeywordIntentClassifier};
pub use registry::{Agent, AgentRegistry};
pub use router::{normalize_proposal, AgentRouter, RouterFlags};
pub use types::{
    AgentInput, AgentOutput, ProposalStatus, ProposedCommand, RiskTier, SelectionMethod,
};

//! Approval-gated proposals: session arming, pending-proposal replay, and
//! idempotent approval execution.

pub mod arm;
pub mod gate;
pub mod pending;

pub use arm::{ArmRegistry, SessionArmState};
pub use gate::{ApprovalOutcome, ProposalGate, WorkspaceExecutor};
pub use pending::{classify_follow_up, FollowUp, PendingProposal, PENDING_META_KEY};

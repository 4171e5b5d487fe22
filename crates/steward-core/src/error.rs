//! Typed error kinds for the core pipeline.
//!
//! Each subsystem raises its own error enum; the service boundary converts
//! every failure into a well-formed response object, never a raw error.

use thiserror::Error;

/// Errors raised while invoking a dispatched agent handler.
///
/// The router is the single conversion point: any `DispatchError` becomes a
/// degraded `AgentOutput` carrying the error in trace. It never propagates
/// past the router.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The selected agent's entrypoint has no registered handler.
    #[error("agent '{agent_id}' has no handler registered for entrypoint '{entrypoint}'")]
    MissingTarget { agent_id: String, entrypoint: String },

    /// The handler itself failed.
    #[error("agent '{agent_id}' failed: {message}")]
    HandlerFailed { agent_id: String, message: String },
}

impl DispatchError {
    pub fn handler_failed(agent_id: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::HandlerFailed {
            agent_id: agent_id.into(),
            message: err.to_string(),
        }
    }
}

/// Errors raised by knowledge backends.
///
/// Clone is required so a single in-flight fetch can hand the same failure
/// to every coalesced waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KnowledgeError {
    /// Remote fetch failed after bounded retries.
    #[error("upstream knowledge fetch failed: {0}")]
    Upstream(String),

    /// The knowledge document could not be parsed.
    #[error("knowledge document is malformed: {0}")]
    Parse(String),

    /// The file backend could not be read.
    #[error("knowledge file unreadable: {0}")]
    Io(String),
}

/// Errors raised by the approval gate.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApprovalError {
    /// No surfaced proposal matches the supplied approval id.
    #[error("no proposal is pending for approval id '{0}'")]
    UnknownApproval(String),

    /// The session was not armed at execution time.
    #[error("session '{0}' is not armed for workspace writes")]
    SessionDisarmed(String),

    /// The execution collaborator rejected the command.
    #[error("workspace execution failed: {0}")]
    ExecutionFailed(String),
}

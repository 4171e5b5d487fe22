//! Per-session write authorization (arm/disarm).
//!
//! Absence of a state means disarmed. Sessions toggle independently; the
//! map supports concurrent toggles without cross-session interference.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

/// One session's write authorization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionArmState {
    pub session_id: String,
    pub armed: bool,
    pub armed_at: Option<DateTime<Utc>>,
    /// Human-readable justification supplied with the last toggle.
    pub justification: Option<String>,
}

/// Session-keyed arm states.
#[derive(Default)]
pub struct ArmRegistry {
    states: DashMap<String, SessionArmState>,
}

impl ArmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a session for workspace writes.
    pub fn arm(&self, session_id: &str, justification: &str) -> SessionArmState {
        let state = SessionArmState {
            session_id: session_id.to_string(),
            armed: true,
            armed_at: Some(Utc::now()),
            justification: Some(justification.to_string()),
        };
        info!(session = session_id, justification, "session armed");
        self.states.insert(session_id.to_string(), state.clone());
        state
    }

    /// Disarm a session.
    pub fn disarm(&self, session_id: &str, justification: &str) -> SessionArmState {
        let state = SessionArmState {
            session_id: session_id.to_string(),
            armed: false,
            armed_at: None,
            justification: Some(justification.to_string()),
        };
        info!(session = session_id, justification, "session disarmed");
        self.states.insert(session_id.to_string(), state.clone());
        state
    }

    /// Whether the session is armed right now. Unknown sessions are disarmed.
    pub fn is_armed(&self, session_id: &str) -> bool {
        self.states
            .get(session_id)
            .map(|state| state.armed)
            .unwrap_or(false)
    }

    pub fn state(&self, session_id: &str) -> Option<SessionArmState> {
        self.states.get(session_id).map(|state| state.clone())
    }
}

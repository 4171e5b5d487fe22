//! Pending-proposal state and short-confirmation classification.
//!
//! A pending proposal is opaque: on a short affirmative it is replayed
//! byte-for-byte, never regenerated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::types::ProposedCommand;

/// Conversation-meta key the pending proposal is stored under.
pub const PENDING_META_KEY: &str = "pending_proposal";

/// The exact proposal list last shown, awaiting a short confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingProposal {
    pub proposals: Vec<ProposedCommand>,
    pub created_at: DateTime<Utc>,
    /// How many times the confirmation prompt has been shown.
    pub confirm_prompts: u32,
}

impl PendingProposal {
    pub fn new(proposals: Vec<ProposedCommand>) -> Self {
        Self {
            proposals,
            created_at: Utc::now(),
            confirm_prompts: 1,
        }
    }
}

/// How a follow-up message relates to a pending proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// Short affirmative: replay the stored list verbatim.
    Confirm,
    /// Negation or explicit cancel phrase: clear the pending state.
    Cancel,
    /// Anything else: clear the pending state and process normally.
    NewTopic,
}

const CONFIRM_PHRASES: &[&str] = &[
    "yes",
    "y",
    "da",
    "ok",
    "okay",
    "yep",
    "yeah",
    "sure",
    "confirm",
    "confirmed",
    "go ahead",
    "do it",
    "proceed",
    "yes please",
];

const CANCEL_PHRASES: &[&str] = &[
    "no",
    "n",
    "nu",
    "nope",
    "cancel",
    "stop",
    "abort",
    "don't",
    "dont",
    "nevermind",
    "never mind",
    "cancel that",
    "no thanks",
];

/// Classify a follow-up while a proposal is pending.
pub fn classify_follow_up(text: &str) -> FollowUp {
    let normalized: String = text
        .trim()
        .to_lowercase()
        .trim_end_matches(['!', '.', '?', ','])
        .to_string();

    if CONFIRM_PHRASES.contains(&normalized.as_str()) {
        FollowUp::Confirm
    } else if CANCEL_PHRASES.contains(&normalized.as_str()) {
        FollowUp::Cancel
    } else {
        FollowUp::NewTopic
    }
}

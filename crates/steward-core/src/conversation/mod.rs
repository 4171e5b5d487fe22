//! Conversation state persistence.

pub mod store;

pub use store::{ConversationStore, ConversationSummary, ConversationTurn, TRUNCATION_MARKER};

//! Conversation persistence.

pub mod conversations;

pub use conversations::{
    ConversationRecord, ConversationStore, ConversationTurnRecord, SessionSummary, SourceRecord,
    TurnData,
};

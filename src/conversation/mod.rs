//! Conversation turns and the remote assistant

mod intensity;
mod service;
mod turn;

pub use intensity::{score_intensity, MAX_INTENSITY};
pub use service::{
    ClientMeta, ConversationReply, ConversationRequest, ConversationService, HistoryEntry,
    HttpConversationService, ReplyBody, ReplyMeta, RequestMetadata,
};
pub use turn::{ConversationTurn, ConversationTurnBuilder, InputSource, Role, TurnHistory, TurnMeta};

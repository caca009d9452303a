pub mod commands;
pub mod events;
pub mod types;

pub use commands::ClientEvent;
pub use events::{ConnectionState, EventKind, IncomingMessage, NetworkEvent, ServerEvent};
pub use types::{
    ChatId, ChatListEntry, ChatMessage, ConversationSummary, LastMessage, PeerInfo, UserId,
    UserProfile,
};

pub mod active_chat;
pub mod chat_list;
pub mod presence;
pub mod session;

pub use active_chat::{ActiveChatSession, ChatEntry, ChatPhase, ChatView, DeliveryStatus};
pub use chat_list::ChatListStore;
pub use presence::PresenceTracker;
pub use session::Session;

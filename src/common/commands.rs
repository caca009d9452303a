use serde::Serialize;
use serde_json::json;

use super::types::{ChatId, ChatMessage, UserId};

/// Outbound named events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Ask the server who is behind a chat so the conversation header can be filled.
    GetUserId(UserId),
    SendMessage {
        chat_id: ChatId,
        message: ChatMessage,
    },
}

#[derive(Serialize)]
struct OutgoingMessage<'a> {
    #[serde(rename = "chatId")]
    chat_id: &'a str,
    #[serde(rename = "newMessage")]
    message: &'a ChatMessage,
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::GetUserId(_) => "get user id",
            ClientEvent::SendMessage { .. } => "send message",
        }
    }

    /// Encodes the event as a `{"event": ..., "data": ...}` text frame.
    pub fn to_frame(&self) -> serde_json::Result<String> {
        let data = match self {
            ClientEvent::GetUserId(user_id) => json!(user_id),
            ClientEvent::SendMessage { chat_id, message } => serde_json::to_value(OutgoingMessage {
                chat_id,
                message,
            })?,
        };
        serde_json::to_string(&json!({ "event": self.name(), "data": data }))
    }
}

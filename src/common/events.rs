use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::types::{ChatId, ChatMessage, OnlineUsers, PeerInfo, deserialize_id};

/// Named inbound events understood by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    UsersConnected,
    NewMessage,
    PeerInfo,
}

impl EventKind {
    pub const fn name(self) -> &'static str {
        match self {
            EventKind::UsersConnected => "users connected",
            EventKind::NewMessage => "get new message",
            EventKind::PeerInfo => "user info",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "users connected" => Some(EventKind::UsersConnected),
            "get new message" => Some(EventKind::NewMessage),
            "user info" => Some(EventKind::PeerInfo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IncomingMessage {
    #[serde(rename = "chatId", deserialize_with = "deserialize_id")]
    pub chat_id: ChatId,
    #[serde(rename = "newMessage")]
    pub message: ChatMessage,
}

/// Inbound event after schema validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    UsersConnected(OnlineUsers),
    NewMessage(IncomingMessage),
    PeerInfo(PeerInfo),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not an event envelope: {0}")]
    Frame(#[source] serde_json::Error),
    #[error("unknown event `{0}`")]
    UnknownEvent(String),
    #[error("invalid payload for `{event}`: {source}")]
    Payload {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::UsersConnected(_) => EventKind::UsersConnected,
            ServerEvent::NewMessage(_) => EventKind::NewMessage,
            ServerEvent::PeerInfo(_) => EventKind::PeerInfo,
        }
    }

    /// Decodes a `{"event": ..., "data": ...}` text frame.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let frame: RawFrame = serde_json::from_str(text).map_err(DecodeError::Frame)?;
        let kind = EventKind::from_name(&frame.event)
            .ok_or_else(|| DecodeError::UnknownEvent(frame.event.clone()))?;
        let payload = |source| DecodeError::Payload {
            event: kind.name(),
            source,
        };

        let event = match kind {
            EventKind::UsersConnected => {
                ServerEvent::UsersConnected(serde_json::from_value(frame.data).map_err(payload)?)
            }
            EventKind::NewMessage => {
                ServerEvent::NewMessage(serde_json::from_value(frame.data).map_err(payload)?)
            }
            EventKind::PeerInfo => {
                ServerEvent::PeerInfo(serde_json::from_value(frame.data).map_err(payload)?)
            }
        };
        Ok(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Notifications the channel task sends up to the application loop.
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    Received(ServerEvent),
    StateChanged(ConnectionState),
}

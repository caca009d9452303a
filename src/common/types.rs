use serde::{Deserialize, Deserializer, Serialize};

pub type UserId = String;
pub type ChatId = String;

/// The backend sends ids either as JSON strings or as numbers.
pub fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(id) => id,
        RawId::Number(id) => id.to_string(),
    })
}

fn deserialize_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapped(#[serde(deserialize_with = "deserialize_id")] String);

    let ids = Vec::<Wrapped>::deserialize(deserializer)?;
    Ok(ids.into_iter().map(|Wrapped(id)| id).collect())
}

/// Full online-user set pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct OnlineUsers(#[serde(deserialize_with = "deserialize_ids")] pub Vec<UserId>);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub full_name: String,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// Preview shown next to a conversation in the chat list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastMessage {
    pub text: String,
    pub read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub chat_id: ChatId,
    pub participant: UserProfile,
    pub last_message: Option<LastMessage>,
}

/// One row of `GET /mischats`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatListEntry {
    #[serde(deserialize_with = "deserialize_id")]
    pub chat_id: ChatId,
    pub full_name: String,
    pub username: String,
    #[serde(rename = "profilePhoto", default)]
    pub profile_photo: Option<String>,
}

impl From<ChatListEntry> for ConversationSummary {
    fn from(entry: ChatListEntry) -> Self {
        Self {
            chat_id: entry.chat_id,
            participant: UserProfile {
                full_name: entry.full_name,
                username: entry.username,
                avatar_url: entry.profile_photo,
            },
            last_message: None,
        }
    }
}

/// A chat message as it travels over the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "senderId", deserialize_with = "deserialize_id")]
    pub sender_id: UserId,
    #[serde(rename = "message")]
    pub text: String,
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "sentAt")]
    pub sent_at: i64,
    #[serde(rename = "readed", default)]
    pub read: bool,
}

impl ChatMessage {
    /// Payloads carry no server-assigned id, so identity is sender + timestamp + text.
    pub fn dedupe_key(&self) -> (&str, i64, &str) {
        (&self.sender_id, self.sent_at, &self.text)
    }

    pub fn same_as(&self, other: &ChatMessage) -> bool {
        self.dedupe_key() == other.dedupe_key()
    }

    pub fn preview(&self) -> LastMessage {
        LastMessage {
            text: self.text.clone(),
            read: self.read,
        }
    }
}

/// Reply to a `get user id` lookup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PeerInfo {
    #[serde(rename = "userId", deserialize_with = "deserialize_id")]
    pub user_id: UserId,
    #[serde(rename = "fullName")]
    pub full_name: String,
    pub username: String,
    #[serde(rename = "profilePhoto", default)]
    pub profile_photo: Option<String>,
}

impl PeerInfo {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            full_name: self.full_name.clone(),
            username: self.username.clone(),
            avatar_url: self.profile_photo.clone(),
        }
    }
}

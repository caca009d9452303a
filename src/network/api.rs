use async_trait::async_trait;
use serde::Deserialize;

use crate::common::ChatListEntry;
use crate::error::{ClientError, Result};

/// The REST backend as seen by the stores.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// `GET /mischats` for the authenticated user.
    async fn fetch_chats(&self) -> Result<Vec<ChatListEntry>>;
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl ChatApi for ApiClient {
    async fn fetch_chats(&self) -> Result<Vec<ChatListEntry>> {
        let response = self
            .http
            .get(self.endpoint("mischats"))
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let envelope: DataEnvelope<Vec<ChatListEntry>> = response.json().await?;
        log::debug!("Fetched {} conversations", envelope.data.len());
        Ok(envelope.data)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slashes() {
        let api = ApiClient::new("https://api.example.com/", "t");
        assert_eq!(api.endpoint("/mischats"), "https://api.example.com/mischats");
        assert_eq!(api.endpoint("mischats"), "https://api.example.com/mischats");
    }

    #[test]
    fn chat_list_envelope_parses() {
        let envelope: DataEnvelope<Vec<ChatListEntry>> = serde_json::from_str(
            r#"{"data":[
                {"chat_id":"c1","full_name":"Ada","username":"ada","profilePhoto":"https://img/ada.png"},
                {"chat_id":2,"full_name":"Bob","username":"bob","profilePhoto":null}
            ]}"#,
        )
        .unwrap();

        let ids: Vec<_> = envelope.data.iter().map(|entry| entry.chat_id.as_str()).collect();
        assert_eq!(ids, ["c1", "2"]);
        assert_eq!(
            envelope.data[0].profile_photo.as_deref(),
            Some("https://img/ada.png")
        );
        assert_eq!(envelope.data[1].profile_photo, None);
    }

    #[tokio::test]
    async fn unreachable_backend_surfaces_an_http_error() {
        let api = ApiClient::new("http://127.0.0.1:9", "t");
        assert!(matches!(api.fetch_chats().await, Err(ClientError::Http(_))));
    }
}

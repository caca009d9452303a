use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP request returned status {status}")]
    HttpStatus { status: u16 },
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Bearer token contains characters not allowed in a header")]
    InvalidToken,
    #[error("Not logged in: no persisted credentials")]
    NotLoggedIn,
    #[error("No conversation is open")]
    NoActiveChat,
    #[error("Message text is empty")]
    EmptyMessage,
}

pub type Result<T> = std::result::Result<T, ClientError>;

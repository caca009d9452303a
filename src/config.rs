use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::network::ChannelSettings;

pub const DEFAULT_CONFIG_PATH: &str = "config/client.json";

// Local backend speaking the `{"event", "data"}` websocket framing.
const DEFAULT_API_URL: &str = "http://localhost:3000";
const DEFAULT_SOCKET_URL: &str = "ws://localhost:3000";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_base_url: String,
    pub socket_url: String,
    pub database_path: String,
    pub event_buffer: usize,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    /// Unset keeps a chat in "opening" until the peer answers.
    pub peer_lookup_timeout_ms: Option<u64>,
    /// Unset leaves unacknowledged sends pending forever.
    pub send_ack_timeout_ms: Option<u64>,
    pub clear_presence_on_disconnect: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            database_path: "data/client.db".to_string(),
            event_buffer: 100,
            reconnect_initial_ms: 500,
            reconnect_max_ms: 30_000,
            peer_lookup_timeout_ms: None,
            send_ack_timeout_ms: None,
            clear_presence_on_disconnect: true,
        }
    }
}

impl AppConfig {
    pub fn channel_settings(&self) -> ChannelSettings {
        ChannelSettings {
            url: self.socket_url.clone(),
            event_buffer: self.event_buffer.max(1),
            reconnect_initial: Duration::from_millis(self.reconnect_initial_ms),
            reconnect_max: Duration::from_millis(self.reconnect_max_ms),
        }
    }

    pub fn peer_lookup_timeout(&self) -> Option<chrono::Duration> {
        self.peer_lookup_timeout_ms.map(millis)
    }

    pub fn send_ack_timeout(&self) -> Option<chrono::Duration> {
        self.send_ack_timeout_ms.map(millis)
    }

    /// Environment (and `.env`) values win over the file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("SOCIAL_CHAT_API_URL") {
            self.api_base_url = url;
        }
        if let Some(url) = lookup("SOCIAL_CHAT_SOCKET_URL") {
            self.socket_url = url;
        }
        if let Some(path) = lookup("SOCIAL_CHAT_DB") {
            self.database_path = path;
        }
    }
}

fn millis(ms: u64) -> chrono::Duration {
    chrono::Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}

/// Writes the defaults to `path` if nothing is there yet. Returns true when a file was created.
pub fn ensure_config_file(path: &str) -> std::io::Result<bool> {
    if Path::new(path).exists() {
        return Ok(false);
    }
    save_config(path, &AppConfig::default())?;
    log::info!("Wrote default config to {path}");
    Ok(true)
}

pub fn save_config(path: &str, config: &AppConfig) -> std::io::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)
}

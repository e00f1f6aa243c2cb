use serde::Deserialize;

use crate::client::credentials::Credentials;

/// Top-level configuration settings for the chat application.
///
/// Includes the client connection settings, the demo's chat channel and
/// the log level.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub client: ClientSettings,
    pub chat: ChatSettings,
    pub log: LogSettings,
}

/// Configuration of a single broker connection.
///
/// Durations are milliseconds. Passed as-is to `Client::new`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ClientSettings {
    /// Broker endpoint, `ws://` only. `wss://` is rejected by `connect`.
    pub url: String,
    /// Upper bound for the whole connect handshake.
    pub timeout_ms: u64,
    /// Send WebSocket pings to detect dead connections.
    pub ping: bool,
    pub ping_interval_ms: u64,
    /// How long to wait for any inbound frame after a ping.
    pub pong_timeout_ms: u64,
    /// Reconnect automatically after the connection drops.
    pub reconnect: bool,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    /// `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
    /// Optional credentials sent in the connect frame.
    pub credentials: Option<Credentials>,
}

/// Settings of the terminal chat demo.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ChatSettings {
    pub channel: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Settings as read from the sources, any of which may be missing. Gaps are filled from defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub client: Option<PartialClientSettings>,
    pub chat: Option<PartialChatSettings>,
    pub log: Option<PartialLogSettings>,
}

/// Partial client settings.
#[derive(Debug, Deserialize)]
pub struct PartialClientSettings {
    pub url: Option<String>,
    pub timeout_ms: Option<u64>,
    pub ping: Option<bool>,
    pub ping_interval_ms: Option<u64>,
    pub pong_timeout_ms: Option<u64>,
    pub reconnect: Option<bool>,
    pub reconnect_delay_ms: Option<u64>,
    pub max_reconnect_delay_ms: Option<u64>,
    pub max_reconnect_attempts: Option<u32>,
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Deserialize)]
pub struct PartialChatSettings {
    pub channel: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/connection/websocket".to_string(),
            timeout_ms: 5_000,
            ping: true,
            ping_interval_ms: 25_000,
            pong_timeout_ms: 10_000,
            reconnect: true,
            reconnect_delay_ms: 500,
            max_reconnect_delay_ms: 20_000,
            max_reconnect_attempts: None,
            credentials: None,
        }
    }
}

/// Provides default values for `Settings`.
///
/// Ensures the application has sensible defaults if no configuration is provided.
impl Default for Settings {
    fn default() -> Self {
        Self {
            client: ClientSettings::default(),
            chat: ChatSettings {
                channel: "chat:index".to_string(),
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl PartialClientSettings {
    /// Fill the missing values from `default`.
    pub fn merge(self, default: ClientSettings) -> ClientSettings {
        ClientSettings {
            url: self.url.unwrap_or(default.url),
            timeout_ms: self.timeout_ms.unwrap_or(default.timeout_ms),
            ping: self.ping.unwrap_or(default.ping),
            ping_interval_ms: self.ping_interval_ms.unwrap_or(default.ping_interval_ms),
            pong_timeout_ms: self.pong_timeout_ms.unwrap_or(default.pong_timeout_ms),
            reconnect: self.reconnect.unwrap_or(default.reconnect),
            reconnect_delay_ms: self
                .reconnect_delay_ms
                .unwrap_or(default.reconnect_delay_ms),
            max_reconnect_delay_ms: self
                .max_reconnect_delay_ms
                .unwrap_or(default.max_reconnect_delay_ms),
            max_reconnect_attempts: self
                .max_reconnect_attempts
                .or(default.max_reconnect_attempts),
            credentials: self.credentials.or(default.credentials),
        }
    }
}

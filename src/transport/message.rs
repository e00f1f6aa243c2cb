//! Wire protocol
//!
//! Every WebSocket text frame carries one JSON object tagged by `type`.
//! Payloads are opaque bytes and travel base64-encoded in `data`.

use serde::{Deserialize, Serialize};

use crate::client::credentials::Credentials;
use crate::utils::{Error, Result};

/// Commands the client sends to the broker.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "connect")]
    Connect {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        credentials: Option<Credentials>,
    },
    #[serde(rename = "subscribe")]
    Subscribe { channel: String },
    #[serde(rename = "unsubscribe")]
    Unsubscribe { channel: String },
    #[serde(rename = "publish")]
    Publish {
        channel: String,
        #[serde(with = "base64_data")]
        data: Vec<u8>,
    },
    /// Ask who is currently subscribed to `channel`.
    #[serde(rename = "presence")]
    Presence { channel: String },
}

/// Frames the broker sends to the client.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Handshake reply carrying the broker-assigned client id.
    #[serde(rename = "connected")]
    Connected { client: String },
    #[serde(rename = "subscribed")]
    Subscribed {
        channel: String,
        #[serde(default)]
        recovered: bool,
    },
    #[serde(rename = "subscribe_error")]
    SubscribeError { channel: String, error: String },
    /// Server-side unsubscribe, or the ack of a client unsubscribe.
    #[serde(rename = "unsubscribed")]
    Unsubscribed { channel: String },
    #[serde(rename = "publication")]
    Publication {
        channel: String,
        #[serde(with = "base64_data")]
        data: Vec<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        info: Option<ClientInfo>,
    },
    #[serde(rename = "join")]
    Join { channel: String, info: ClientInfo },
    #[serde(rename = "leave")]
    Leave { channel: String, info: ClientInfo },
    /// Reply to a presence request.
    #[serde(rename = "presence")]
    Presence {
        channel: String,
        #[serde(default)]
        clients: Vec<ClientInfo>,
    },
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "disconnect")]
    Disconnect {
        reason: String,
        #[serde(default)]
        reconnect: bool,
    },
}

impl ServerMessage {
    /// Channel the frame is scoped to, `None` for connection-level frames.
    pub fn channel(&self) -> Option<&str> {
        match self {
            ServerMessage::Subscribed { channel, .. }
            | ServerMessage::SubscribeError { channel, .. }
            | ServerMessage::Unsubscribed { channel }
            | ServerMessage::Publication { channel, .. }
            | ServerMessage::Join { channel, .. }
            | ServerMessage::Leave { channel, .. }
            | ServerMessage::Presence { channel, .. } => Some(channel),
            ServerMessage::Connected { .. }
            | ServerMessage::Error { .. }
            | ServerMessage::Disconnect { .. } => None,
        }
    }
}

/// Identity of a connection as reported by the broker.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ClientInfo {
    pub user: String,
    pub client: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_info: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_info: Option<serde_json::Value>,
}

pub fn encode(msg: &ClientMessage) -> Result<String> {
    Ok(serde_json::to_string(msg)?)
}

pub fn decode(text: &str) -> Result<ServerMessage> {
    serde_json::from_str(text).map_err(|e| {
        Error::Protocol(format!(
            "{e} | {}",
            text.chars().take(100).collect::<String>()
        ))
    })
}

mod base64_data {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

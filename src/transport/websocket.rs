//! WebSocket transport
//!
//! Opens the socket to the broker and performs the connect handshake:
//! the client sends a `connect` frame (with credentials when configured)
//! and waits for `connected`, which carries the client id assigned by the
//! broker. The whole exchange is bounded by `timeout_ms`.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;
use tungstenite::protocol::Message as WsMessage;
use url::Url;

use crate::config::ClientSettings;
use crate::transport::message::{self, ClientMessage, ServerMessage};
use crate::utils::{Error, Result};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Check that `url` names a broker endpoint this build can reach.
pub fn validate_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| Error::Transport(format!("Invalid url {url}: {e}")))?;
    match parsed.scheme() {
        "ws" => Ok(parsed),
        "wss" => Err(Error::Transport(
            "wss endpoints need a TLS-enabled build".to_string(),
        )),
        other => Err(Error::Transport(format!(
            "Unsupported scheme {other}, expected ws"
        ))),
    }
}

/// Open the socket and complete the connect handshake.
pub async fn establish(settings: &ClientSettings) -> Result<(WsStream, String)> {
    let timeout = Duration::from_millis(settings.timeout_ms);
    match tokio::time::timeout(timeout, handshake(settings)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Transport(format!("Connection timeout ({timeout:?})"))),
    }
}

async fn handshake(settings: &ClientSettings) -> Result<(WsStream, String)> {
    debug!("Opening WebSocket to {}", settings.url);
    let (mut ws, _response) = connect_async(settings.url.as_str()).await?;

    send(
        &mut ws,
        &ClientMessage::Connect {
            credentials: settings.credentials.clone(),
        },
    )
    .await?;

    while let Some(frame) = ws.next().await {
        let text = match frame? {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            _ => continue,
        };
        return match message::decode(&text)? {
            ServerMessage::Connected { client } => Ok((ws, client)),
            ServerMessage::Error { message } => {
                Err(Error::Transport(format!("Connect rejected: {message}")))
            }
            ServerMessage::Disconnect { reason, .. } => Err(Error::Transport(reason)),
            other => Err(Error::Protocol(format!(
                "Expected connected frame, got {other:?}"
            ))),
        };
    }

    Err(Error::Transport(
        "Connection closed during handshake".to_string(),
    ))
}

/// Encode and write one frame.
pub async fn send(ws: &mut WsStream, msg: &ClientMessage) -> Result<()> {
    let text = message::encode(msg)?;
    ws.send(WsMessage::Text(text.into())).await?;
    Ok(())
}

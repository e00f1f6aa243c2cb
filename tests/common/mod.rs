#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chatlink::client::{ClientInfo, Event};
use chatlink::config::ClientSettings;
use chatlink::transport::message::{ClientMessage, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tungstenite::protocol::Message as WsMessage;

const WAIT: Duration = Duration::from_secs(5);

/// Something the test wants the broker to do on the latest connection.
enum Outbound {
    Frame(ServerMessage),
    Raw(String),
    /// Drop the socket without a close frame.
    Drop,
}

#[derive(Debug, Clone)]
pub struct Received {
    pub conn: usize,
    pub msg: ClientMessage,
}

#[derive(Clone)]
pub struct MockOptions {
    /// Acknowledge subscribe requests automatically.
    pub auto_ack: bool,
    /// Send publications back to the publishing connection.
    pub echo: bool,
    /// Complete the first handshake, then stop reading so pings go
    /// unanswered. Later connections behave normally.
    pub stall_first: bool,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            auto_ack: true,
            echo: false,
            stall_first: false,
        }
    }
}

/// In-process stand-in for the broker: speaks the wire protocol over a
/// real WebSocket on 127.0.0.1 and records everything clients send.
pub struct MockBroker {
    pub url: String,
    received: mpsc::UnboundedReceiver<Received>,
    connections: Arc<Mutex<Vec<mpsc::UnboundedSender<Outbound>>>>,
    rejected: Arc<Mutex<HashSet<String>>>,
}

impl MockBroker {
    pub async fn start() -> Self {
        Self::start_with(MockOptions::default()).await
    }

    pub async fn start_with(options: MockOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (record_tx, received) = mpsc::unbounded_channel();
        let connections: Arc<Mutex<Vec<mpsc::UnboundedSender<Outbound>>>> = Arc::default();
        let rejected: Arc<Mutex<HashSet<String>>> = Arc::default();

        {
            let connections = connections.clone();
            let rejected = rejected.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let ws = match accept_async(stream).await {
                        Ok(ws) => ws,
                        Err(_) => continue,
                    };
                    let (out_tx, out_rx) = mpsc::unbounded_channel();
                    let conn = {
                        let mut connections = connections.lock().unwrap();
                        connections.push(out_tx);
                        connections.len() - 1
                    };
                    tokio::spawn(serve(
                        ws,
                        conn,
                        out_rx,
                        record_tx.clone(),
                        rejected.clone(),
                        options.clone(),
                    ));
                }
            });
        }

        Self {
            url: format!("ws://{addr}"),
            received,
            connections,
            rejected,
        }
    }

    /// Send a frame on the most recent connection.
    pub fn send(&self, frame: ServerMessage) {
        self.outbound(Outbound::Frame(frame));
    }

    pub fn send_raw(&self, text: &str) {
        self.outbound(Outbound::Raw(text.to_string()));
    }

    pub fn drop_connection(&self) {
        self.outbound(Outbound::Drop);
    }

    pub fn reject(&self, channel: &str) {
        self.rejected.lock().unwrap().insert(channel.to_string());
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    fn outbound(&self, out: Outbound) {
        let connections = self.connections.lock().unwrap();
        let latest = connections.last().expect("no client connected");
        let _ = latest.send(out);
    }

    pub async fn next(&mut self) -> Received {
        tokio::time::timeout(WAIT, self.received.recv())
            .await
            .expect("broker waited too long for a client message")
            .expect("broker closed")
    }

    /// Next message that is not a handshake.
    pub async fn next_command(&mut self) -> Received {
        loop {
            let received = self.next().await;
            if !matches!(received.msg, ClientMessage::Connect { .. }) {
                return received;
            }
        }
    }

    pub async fn expect_silence(&mut self, wait: Duration) {
        if let Ok(Some(received)) = tokio::time::timeout(wait, self.received.recv()).await {
            panic!("unexpected client message: {:?}", received);
        }
    }
}

async fn serve(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    conn: usize,
    mut out_rx: mpsc::UnboundedReceiver<Outbound>,
    record_tx: mpsc::UnboundedSender<Received>,
    rejected: Arc<Mutex<HashSet<String>>>,
    options: MockOptions,
) {
    let (mut ws_sender, mut ws_receiver) = ws.split();
    let client_id = format!("client-{}", uuid::Uuid::new_v4());

    loop {
        let replies: Vec<String> = tokio::select! {
            out = out_rx.recv() => match out {
                Some(Outbound::Frame(frame)) => vec![serde_json::to_string(&frame).unwrap()],
                Some(Outbound::Raw(text)) => vec![text],
                Some(Outbound::Drop) | None => return,
            },
            msg = ws_receiver.next() => {
                let Some(Ok(msg)) = msg else { return };
                if !msg.is_text() {
                    continue;
                }
                let msg: ClientMessage = serde_json::from_str(msg.to_text().unwrap()).unwrap();
                let _ = record_tx.send(Received { conn, msg: msg.clone() });
                if options.stall_first && conn == 0 && matches!(msg, ClientMessage::Connect { .. }) {
                    let connected = ServerMessage::Connected { client: client_id.clone() };
                    let text = serde_json::to_string(&connected).unwrap();
                    let _ = ws_sender.send(WsMessage::Text(text.into())).await;
                    // hold the socket open without ever reading it again
                    while let Some(out) = out_rx.recv().await {
                        if matches!(out, Outbound::Drop) {
                            return;
                        }
                    }
                    return;
                }
                reply(&msg, &client_id, &rejected, &options)
                    .into_iter()
                    .map(|frame| serde_json::to_string(&frame).unwrap())
                    .collect()
            }
        };
        for text in replies {
            if ws_sender.send(WsMessage::Text(text.into())).await.is_err() {
                return;
            }
        }
    }
}

fn reply(
    msg: &ClientMessage,
    client_id: &str,
    rejected: &Mutex<HashSet<String>>,
    options: &MockOptions,
) -> Vec<ServerMessage> {
    match msg {
        ClientMessage::Connect { .. } => vec![ServerMessage::Connected {
            client: client_id.to_string(),
        }],
        ClientMessage::Subscribe { channel } if options.auto_ack => {
            if rejected.lock().unwrap().contains(channel) {
                vec![ServerMessage::SubscribeError {
                    channel: channel.clone(),
                    error: "permission denied".to_string(),
                }]
            } else {
                vec![ServerMessage::Subscribed {
                    channel: channel.clone(),
                    recovered: false,
                }]
            }
        }
        ClientMessage::Unsubscribe { channel } => vec![ServerMessage::Unsubscribed {
            channel: channel.clone(),
        }],
        ClientMessage::Presence { channel } => vec![ServerMessage::Presence {
            channel: channel.clone(),
            clients: vec![ClientInfo {
                user: String::new(),
                client: client_id.to_string(),
                ..ClientInfo::default()
            }],
        }],
        ClientMessage::Publish { channel, data } if options.echo => {
            vec![ServerMessage::Publication {
                channel: channel.clone(),
                data: data.clone(),
                info: Some(ClientInfo {
                    user: String::new(),
                    client: client_id.to_string(),
                    ..ClientInfo::default()
                }),
            }]
        }
        _ => Vec::new(),
    }
}

/// Client settings tuned for tests: short timeouts and backoff.
pub fn settings(url: &str) -> ClientSettings {
    ClientSettings {
        url: url.to_string(),
        timeout_ms: 2_000,
        reconnect_delay_ms: 20,
        max_reconnect_delay_ms: 100,
        ..ClientSettings::default()
    }
}

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("no event in time")
        .expect("event channel closed")
}

/// Skip events until one matches `pred`.
pub async fn wait_for(
    rx: &mut mpsc::UnboundedReceiver<Event>,
    pred: impl Fn(&Event) -> bool,
) -> Event {
    loop {
        let event = next_event(rx).await;
        if pred(&event) {
            return event;
        }
    }
}

pub async fn expect_no_event(rx: &mut mpsc::UnboundedReceiver<Event>, wait: Duration) {
    if let Ok(Some(event)) = tokio::time::timeout(wait, rx.recv()).await {
        panic!("unexpected event: {:?}", event);
    }
}

//! Connection task
//!
//! One background task per client owns the WebSocket. It:
//! - performs the handshake and reconnects with exponential backoff
//! - reads frames and feeds them to the dispatcher, in arrival order
//! - writes the commands queued by the client (subscribe, publish, ...)
//! - (re)submits subscribe requests in registration order after connecting
//! - sends keepalive pings and drops the session when the broker goes quiet
//!
//! The client and the task share a [`Shared`] value behind a mutex. The lock
//! is never held across an `.await` or while a handler runs. Shutdown is a
//! `watch` flag the task selects on wherever it waits, so `close` also
//! interrupts a handshake or a backoff sleep.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::client::dispatcher::{Dispatcher, Outcome};
use crate::client::events::{
    ConnectEvent, DisconnectEvent, ErrorEvent, Event, SubEventHandler, UnsubscribeEvent,
};
use crate::client::registry::{Registry, SubscriptionState};
use crate::config::ClientSettings;
use crate::transport::message::{ClientInfo, ClientMessage};
use crate::transport::websocket::{self, WsStream};
use crate::utils::Error;

/// Floor for reconnect delays so a zero setting cannot spin.
const MIN_RECONNECT_DELAY_MS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// `connect` was never called.
    Uninitialized,
    Connecting,
    Connected,
    Disconnected,
    /// Terminal.
    Closed,
}

/// State shared between the client handle and the connection task.
#[derive(Debug)]
pub(crate) struct Shared {
    pub state: ConnectionState,
    pub client_id: Option<String>,
    /// Bumped on every successful handshake.
    pub epoch: u64,
    pub registry: Registry,
    /// Unsubscribe requests written in this session whose ack is still due.
    unsubscribe_acks: HashMap<String, u32>,
    /// Presence requests awaiting a reply, oldest first.
    presence: HashMap<String, VecDeque<oneshot::Sender<Vec<ClientInfo>>>>,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            state: ConnectionState::Uninitialized,
            client_id: None,
            epoch: 0,
            registry: Registry::new(),
            unsubscribe_acks: HashMap::new(),
            presence: HashMap::new(),
        }
    }

    pub(crate) fn expect_unsubscribe_ack(&mut self, channel: &str) {
        *self.unsubscribe_acks.entry(channel.to_string()).or_default() += 1;
    }

    /// Consume one outstanding ack for `channel`. `false` means the broker
    /// removed the subscription on its own.
    pub(crate) fn take_unsubscribe_ack(&mut self, channel: &str) -> bool {
        match self.unsubscribe_acks.get_mut(channel) {
            Some(count) => {
                *count -= 1;
                if *count == 0 {
                    self.unsubscribe_acks.remove(channel);
                }
                true
            }
            None => false,
        }
    }

    pub(crate) fn await_presence(
        &mut self,
        channel: &str,
        reply: oneshot::Sender<Vec<ClientInfo>>,
    ) {
        self.presence
            .entry(channel.to_string())
            .or_default()
            .push_back(reply);
    }

    pub(crate) fn take_presence(
        &mut self,
        channel: &str,
    ) -> Option<oneshot::Sender<Vec<ClientInfo>>> {
        let waiting = self.presence.get_mut(channel)?;
        let reply = waiting.pop_front();
        if waiting.is_empty() {
            self.presence.remove(channel);
        }
        reply
    }

    /// Forget everything tied to the socket that just went away. Dropping
    /// the presence senders fails the callers still waiting.
    pub(crate) fn session_ended(&mut self) {
        self.unsubscribe_acks.clear();
        self.presence.clear();
    }
}

/// Lock the shared state. A handler that panicked elsewhere must not take
/// the whole client down with it, so poisoning is ignored.
pub(crate) fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Work queued by the client for the connection task.
#[derive(Debug)]
pub(crate) enum Command {
    /// Leave the idle state and connect again.
    Connect,
    /// End the session without reconnecting.
    Disconnect,
    Subscribe(String),
    Unsubscribe {
        channel: String,
        handler: SubEventHandler,
    },
    Publish {
        channel: String,
        data: Vec<u8>,
    },
    Presence {
        channel: String,
        reply: oneshot::Sender<Vec<ClientInfo>>,
    },
}

/// Delay before reconnect attempt number `attempt` (zero based).
pub(crate) fn backoff_delay(settings: &ClientSettings, attempt: u32) -> Duration {
    let delay = settings
        .reconnect_delay_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(settings.max_reconnect_delay_ms)
        .max(MIN_RECONNECT_DELAY_MS);
    Duration::from_millis(delay)
}

enum SessionEnd {
    /// `close` was called or the client is gone.
    Closed,
    /// The application asked to disconnect.
    Voluntary,
    Dropped { reason: String, reconnect: bool },
}

impl SessionEnd {
    fn transport(e: Error) -> Self {
        SessionEnd::Dropped {
            reason: e.to_string(),
            reconnect: true,
        }
    }
}

/// Why the task stopped waiting while offline.
enum Wake {
    Shutdown,
    Connect,
    Disconnect,
    Elapsed,
}

pub(crate) struct Connection {
    settings: ClientSettings,
    shared: Arc<Mutex<Shared>>,
    dispatcher: Dispatcher,
    commands: mpsc::UnboundedReceiver<Command>,
    shutdown: watch::Receiver<bool>,
}

impl Connection {
    pub(crate) fn new(
        settings: ClientSettings,
        shared: Arc<Mutex<Shared>>,
        dispatcher: Dispatcher,
        commands: mpsc::UnboundedReceiver<Command>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            settings,
            shared,
            dispatcher,
            commands,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        let mut attempt: u32 = 0;
        let mut active = true;

        loop {
            if self.is_closed() {
                break;
            }

            if !active {
                match self.next_offline().await {
                    Wake::Connect => {
                        active = true;
                        attempt = 0;
                    }
                    Wake::Shutdown => break,
                    Wake::Disconnect | Wake::Elapsed => {}
                }
                continue;
            }

            if !self.set_state(ConnectionState::Connecting) {
                break;
            }

            let established = tokio::select! {
                biased;
                _ = wait_shutdown(&mut self.shutdown) => break,
                result = websocket::establish(&self.settings) => result,
            };

            let end = match established {
                Ok((ws, client_id)) => {
                    attempt = 0;
                    self.session(ws, client_id).await
                }
                Err(e) => {
                    warn!("Connection attempt to {} failed: {}", self.settings.url, e);
                    SessionEnd::transport(e)
                }
            };

            let (reason, reconnect) = match end {
                SessionEnd::Closed => break,
                SessionEnd::Voluntary => {
                    self.connection_lost("client disconnect".to_string(), false);
                    active = false;
                    continue;
                }
                SessionEnd::Dropped { reason, reconnect } => (reason, reconnect),
            };

            let exhausted = self
                .settings
                .max_reconnect_attempts
                .is_some_and(|max| attempt >= max);
            let will_reconnect = reconnect && self.settings.reconnect && !exhausted;
            self.connection_lost(reason, will_reconnect);

            if !will_reconnect {
                if exhausted {
                    self.dispatcher.emit(Event::Error(ErrorEvent {
                        message: format!("Gave up reconnecting after {attempt} attempt(s)"),
                    }));
                }
                active = false;
                continue;
            }

            let delay = backoff_delay(&self.settings, attempt);
            attempt += 1;
            info!("Reconnecting in {:?} (attempt {})", delay, attempt);

            let wake = tokio::select! {
                _ = tokio::time::sleep(delay) => Wake::Elapsed,
                wake = self.next_offline() => wake,
            };
            match wake {
                Wake::Shutdown => break,
                Wake::Disconnect => {
                    // the retry announced above is off
                    self.dispatcher.emit(Event::Disconnect(DisconnectEvent {
                        reason: "client disconnect".to_string(),
                        reconnect: false,
                    }));
                    active = false;
                }
                Wake::Connect | Wake::Elapsed => {}
            }
        }

        debug!("Connection task for {} finished", self.settings.url);
    }

    /// Drive one established session until it ends.
    async fn session(&mut self, mut ws: WsStream, client_id: String) -> SessionEnd {
        let (epoch, pending) = {
            let mut shared = lock(&self.shared);
            if shared.state == ConnectionState::Closed {
                return SessionEnd::Closed;
            }
            shared.state = ConnectionState::Connected;
            shared.client_id = Some(client_id.clone());
            shared.epoch += 1;
            let epoch = shared.epoch;
            (epoch, shared.registry.take_pending(epoch))
        };

        info!("Connected to {} with client id {}", self.settings.url, client_id);
        self.dispatcher
            .emit(Event::Connect(ConnectEvent { client_id }));

        for channel in pending {
            debug!("Requesting subscription to {}", channel);
            if let Err(e) = websocket::send(&mut ws, &ClientMessage::Subscribe { channel }).await {
                return SessionEnd::transport(e);
            }
        }

        let ping_every = Duration::from_millis(self.settings.ping_interval_ms);
        let pong_timeout = Duration::from_millis(self.settings.pong_timeout_ms);
        let keepalive = self.settings.ping && !ping_every.is_zero();
        let mut ping_at = Instant::now() + ping_every;
        let mut pong_deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;

                _ = wait_shutdown(&mut self.shutdown) => {
                    let _ = ws.close(None).await;
                    return SessionEnd::Closed;
                }

                _ = tokio::time::sleep_until(pong_deadline.unwrap_or(ping_at)), if pong_deadline.is_some() => {
                    warn!("No response within {:?} after ping", pong_timeout);
                    return SessionEnd::Dropped {
                        reason: format!("no pong within {pong_timeout:?}"),
                        reconnect: true,
                    };
                }

                cmd = self.commands.recv() => {
                    let Some(cmd) = cmd else {
                        let _ = ws.close(None).await;
                        return SessionEnd::Closed;
                    };
                    if let Some(end) = self.handle_online(&mut ws, epoch, cmd).await {
                        return end;
                    }
                }

                _ = tokio::time::sleep_until(ping_at), if keepalive && pong_deadline.is_none() => {
                    if let Err(e) = ws.send(WsMessage::Ping(Default::default())).await {
                        return SessionEnd::transport(e.into());
                    }
                    if !pong_timeout.is_zero() {
                        pong_deadline = Some(Instant::now() + pong_timeout);
                    }
                    ping_at = Instant::now() + ping_every;
                }

                frame = ws.next() => {
                    ping_at = Instant::now() + ping_every;
                    pong_deadline = None;

                    let outcome = match frame {
                        Some(Ok(WsMessage::Text(text))) => self.dispatcher.dispatch_text(&text),
                        Some(Ok(WsMessage::Binary(data))) => match std::str::from_utf8(&data) {
                            Ok(text) => self.dispatcher.dispatch_text(text),
                            Err(_) => {
                                self.dispatcher.emit(Event::Error(ErrorEvent {
                                    message: "binary frame is not valid UTF-8".to_string(),
                                }));
                                Outcome::Continue
                            }
                        },
                        Some(Ok(WsMessage::Close(frame))) => {
                            let reason = frame
                                .map(|f| format!("{} (code: {})", f.reason, u16::from(f.code)))
                                .unwrap_or_else(|| "server closed connection".to_string());
                            return SessionEnd::Dropped { reason, reconnect: true };
                        }
                        Some(Ok(_)) => Outcome::Continue,
                        Some(Err(e)) => {
                            return SessionEnd::Dropped {
                                reason: format!("WebSocket error: {e}"),
                                reconnect: true,
                            };
                        }
                        None => {
                            return SessionEnd::Dropped {
                                reason: "WebSocket stream ended".to_string(),
                                reconnect: true,
                            };
                        }
                    };

                    if let Outcome::Disconnect { reason, reconnect } = outcome {
                        let _ = ws.close(None).await;
                        return SessionEnd::Dropped { reason, reconnect };
                    }
                }
            }
        }
    }

    async fn handle_online(
        &mut self,
        ws: &mut WsStream,
        epoch: u64,
        cmd: Command,
    ) -> Option<SessionEnd> {
        match cmd {
            Command::Connect => None,
            Command::Disconnect => {
                let _ = ws.close(None).await;
                Some(SessionEnd::Voluntary)
            }
            Command::Subscribe(channel) => {
                if !lock(&self.shared).registry.mark_requested(&channel, epoch) {
                    return None;
                }
                debug!("Requesting subscription to {}", channel);
                websocket::send(ws, &ClientMessage::Subscribe { channel })
                    .await
                    .err()
                    .map(SessionEnd::transport)
            }
            Command::Unsubscribe { channel, handler } => {
                lock(&self.shared).expect_unsubscribe_ack(&channel);
                let sent = websocket::send(
                    ws,
                    &ClientMessage::Unsubscribe {
                        channel: channel.clone(),
                    },
                )
                .await;
                self.dispatcher
                    .emit_to(&handler, Event::Unsubscribe(UnsubscribeEvent { channel }));
                sent.err().map(SessionEnd::transport)
            }
            Command::Publish { channel, data } => {
                if lock(&self.shared).registry.state(&channel) != SubscriptionState::Subscribed {
                    debug!("Dropping publication to {}: no longer subscribed", channel);
                    return None;
                }
                websocket::send(ws, &ClientMessage::Publish { channel, data })
                    .await
                    .err()
                    .map(SessionEnd::transport)
            }
            Command::Presence { channel, reply } => {
                {
                    let mut shared = lock(&self.shared);
                    if shared.registry.state(&channel) != SubscriptionState::Subscribed {
                        // dropping `reply` fails the request
                        return None;
                    }
                    shared.await_presence(&channel, reply);
                }
                debug!("Requesting presence of {}", channel);
                websocket::send(ws, &ClientMessage::Presence { channel })
                    .await
                    .err()
                    .map(SessionEnd::transport)
            }
        }
    }

    /// Wait for a command that changes what the task should do while no
    /// session is running. Other commands are settled on the spot.
    async fn next_offline(&mut self) -> Wake {
        loop {
            let cmd = tokio::select! {
                biased;
                _ = wait_shutdown(&mut self.shutdown) => return Wake::Shutdown,
                cmd = self.commands.recv() => cmd,
            };
            match cmd {
                None => return Wake::Shutdown,
                Some(Command::Connect) => return Wake::Connect,
                Some(Command::Disconnect) => return Wake::Disconnect,
                // requested once the next session starts
                Some(Command::Subscribe(_)) => {}
                Some(Command::Unsubscribe { channel, handler }) => {
                    self.dispatcher
                        .emit_to(&handler, Event::Unsubscribe(UnsubscribeEvent { channel }));
                }
                Some(Command::Publish { channel, .. }) => {
                    debug!("Dropping publication to {}: not connected", channel);
                }
                Some(Command::Presence { channel, .. }) => {
                    debug!("Dropping presence request for {}: not connected", channel);
                }
            }
        }
    }

    /// Record the end of a session (or a failed attempt) and tell the
    /// application about it.
    fn connection_lost(&self, reason: String, reconnect: bool) {
        {
            let mut shared = lock(&self.shared);
            if shared.state == ConnectionState::Closed {
                return;
            }
            shared.state = ConnectionState::Disconnected;
            shared.client_id = None;
            shared.registry.connection_lost();
            shared.session_ended();
        }
        info!("Disconnected from {}: {}", self.settings.url, reason);
        self.dispatcher
            .emit(Event::Disconnect(DisconnectEvent { reason, reconnect }));
    }

    /// Returns `false` if the client was closed in the meantime.
    fn set_state(&self, state: ConnectionState) -> bool {
        let mut shared = lock(&self.shared);
        if shared.state == ConnectionState::Closed {
            return false;
        }
        shared.state = state;
        true
    }

    fn is_closed(&self) -> bool {
        lock(&self.shared).state == ConnectionState::Closed
    }
}

/// Resolves once `close` raised the flag or every client handle is gone.
async fn wait_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|closed| *closed).await;
}

//! Client facade
//!
//! `Client` is a cheap, cloneable handle. All clones share one connection
//! task, one subscription registry and one connection state. Nothing here
//! blocks: every call takes the shared lock briefly and, when the socket is
//! involved, queues a command for the connection task.
//!
//! Publishing is fire-and-forget. `publish` returns once the payload is
//! queued; no broker confirmation is awaited or reported.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::client::dispatcher::Dispatcher;
use crate::client::events::{Event, EventHandler, SubEventHandler, UnsubscribeEvent};
use crate::client::registry::SubscriptionState;
use crate::client::subscription::{PresenceData, Subscription};
use crate::config::ClientSettings;
use crate::transport::connection::{Command, Connection, ConnectionState, Shared, lock};
use crate::transport::websocket;
use crate::utils::{Error, Result};

#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    settings: ClientSettings,
    shared: Arc<Mutex<Shared>>,
    dispatcher: Dispatcher,
    commands: mpsc::UnboundedSender<Command>,
    /// Taken by the connection task on the first `connect`.
    pending: Mutex<Option<Pending>>,
    task: Mutex<Option<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

struct Pending {
    commands: mpsc::UnboundedReceiver<Command>,
    shutdown: watch::Receiver<bool>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.inner.settings.url)
            .field("state", &self.state())
            .finish()
    }
}

impl Client {
    /// Create a client for `settings.url`. No I/O happens until
    /// [`connect`](Client::connect).
    pub fn new(settings: ClientSettings, events: EventHandler) -> Self {
        let shared = Arc::new(Mutex::new(Shared::new()));
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                dispatcher: Dispatcher::new(shared.clone(), events),
                settings,
                shared,
                commands,
                pending: Mutex::new(Some(Pending {
                    commands: command_rx,
                    shutdown: shutdown_rx,
                })),
                task: Mutex::new(None),
                shutdown,
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.settings.url
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.inner.shared).state
    }

    /// Id assigned by the broker for the current session.
    pub fn client_id(&self) -> Option<String> {
        lock(&self.inner.shared).client_id.clone()
    }

    /// Start connecting in the background.
    ///
    /// Returns as soon as the attempt is under way; the outcome arrives as a
    /// `Connect` or `Disconnect` event. Must be called from within a tokio
    /// runtime. Calling it while connecting or connected is a no-op.
    pub fn connect(&self) -> Result<()> {
        let mut shared = lock(&self.inner.shared);
        let state = shared.state;
        match state {
            ConnectionState::Closed => Err(Error::ConnectionClosed),
            ConnectionState::Connecting | ConnectionState::Connected => Ok(()),
            ConnectionState::Disconnected => self.send(Command::Connect),
            ConnectionState::Uninitialized => {
                websocket::validate_url(&self.inner.settings.url)?;
                let runtime = tokio::runtime::Handle::try_current()
                    .map_err(|e| Error::Transport(format!("No tokio runtime: {e}")))?;
                let Some(pending) = self
                    .inner
                    .pending
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .take()
                else {
                    return Err(Error::ConnectionClosed);
                };

                let connection = Connection::new(
                    self.inner.settings.clone(),
                    self.inner.shared.clone(),
                    self.inner.dispatcher.clone(),
                    pending.commands,
                    pending.shutdown,
                );
                shared.state = ConnectionState::Connecting;
                drop(shared);

                info!("Connecting to {}", self.inner.settings.url);
                let handle = runtime.spawn(connection.run());
                *self
                    .inner
                    .task
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(handle);
                Ok(())
            }
        }
    }

    /// End the current session without reconnecting. A later
    /// [`connect`](Client::connect) resumes, resubscribing every channel.
    pub fn disconnect(&self) -> Result<()> {
        let state = lock(&self.inner.shared).state;
        match state {
            ConnectionState::Closed => Err(Error::ConnectionClosed),
            ConnectionState::Uninitialized => Ok(()),
            _ => self.send(Command::Disconnect),
        }
    }

    /// Close the client for good.
    ///
    /// Subscriptions are dropped, the connection task is told to release the
    /// socket (also mid-handshake or mid-backoff) and no further events are
    /// delivered. Handlers already running may finish. Idempotent.
    pub fn close(&self) {
        {
            let mut shared = lock(&self.inner.shared);
            if shared.state == ConnectionState::Closed {
                return;
            }
            shared.state = ConnectionState::Closed;
            shared.client_id = None;
            shared.registry.clear();
            shared.session_ended();
        }
        self.inner.shutdown.send_replace(true);
        info!("Client for {} closed", self.inner.settings.url);
    }

    /// [`close`](Client::close) and wait for the connection task to exit.
    ///
    /// Must not be awaited from inside an event handler, which runs on that
    /// very task.
    pub async fn shutdown(&self) {
        self.close();
        let handle = self
            .inner
            .task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                debug!("Connection task ended abnormally: {}", e);
            }
        }
    }

    /// Register `channel` with its handler set.
    ///
    /// The subscribe request goes out as soon as the client is connected, and
    /// again after every reconnect.
    pub fn subscribe(&self, channel: &str, events: SubEventHandler) -> Result<Subscription> {
        let mut shared = lock(&self.inner.shared);
        if shared.state == ConnectionState::Closed {
            return Err(Error::ConnectionClosed);
        }
        shared.registry.insert(channel, events)?;
        if shared.state == ConnectionState::Connected {
            self.send(Command::Subscribe(channel.to_string()))?;
        }
        debug!("Registered subscription to {}", channel);
        Ok(Subscription::new(self.clone(), channel))
    }

    /// Handle to an existing subscription.
    pub fn subscription(&self, channel: &str) -> Option<Subscription> {
        lock(&self.inner.shared)
            .registry
            .contains(channel)
            .then(|| Subscription::new(self.clone(), channel))
    }

    /// Channels in registration order.
    pub fn channels(&self) -> Vec<String> {
        lock(&self.inner.shared).registry.channels()
    }

    /// Remove `channel`. Its handler set receives `Unsubscribe` once the
    /// removal is done, whether or not the broker acknowledges it.
    pub fn unsubscribe(&self, channel: &str) -> Result<()> {
        let mut shared = lock(&self.inner.shared);
        if shared.state == ConnectionState::Closed {
            return Err(Error::ConnectionClosed);
        }
        let handler = shared.registry.remove(channel)?;
        if shared.state == ConnectionState::Uninitialized {
            // no connection task yet to deliver it
            drop(shared);
            handler.emit(Event::Unsubscribe(UnsubscribeEvent {
                channel: channel.to_string(),
            }));
            return Ok(());
        }
        self.send(Command::Unsubscribe {
            channel: channel.to_string(),
            handler,
        })
    }

    /// Queue `data` for `channel`. Fails with `NotSubscribed` unless the
    /// subscription is acknowledged by the broker.
    pub fn publish(&self, channel: &str, data: impl Into<Vec<u8>>) -> Result<()> {
        let shared = lock(&self.inner.shared);
        if shared.state == ConnectionState::Closed {
            return Err(Error::ConnectionClosed);
        }
        if shared.registry.state(channel) != SubscriptionState::Subscribed {
            return Err(Error::NotSubscribed(channel.to_string()));
        }
        // queued under the lock so a concurrent close either sees it or
        // rejects it
        self.send(Command::Publish {
            channel: channel.to_string(),
            data: data.into(),
        })
    }

    /// Ask the broker who is subscribed to `channel`.
    ///
    /// Only valid while the subscription is acknowledged. The wait is bounded
    /// by `timeout_ms`; losing the session fails the request.
    pub async fn presence(&self, channel: &str) -> Result<PresenceData> {
        let reply = {
            let shared = lock(&self.inner.shared);
            if shared.state == ConnectionState::Closed {
                return Err(Error::ConnectionClosed);
            }
            if shared.registry.state(channel) != SubscriptionState::Subscribed {
                return Err(Error::NotSubscribed(channel.to_string()));
            }
            let (reply, rx) = oneshot::channel();
            self.send(Command::Presence {
                channel: channel.to_string(),
                reply,
            })?;
            rx
        };

        let timeout = Duration::from_millis(self.inner.settings.timeout_ms);
        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(clients)) => Ok(PresenceData { clients }),
            Ok(Err(_)) if self.state() == ConnectionState::Closed => Err(Error::ConnectionClosed),
            Ok(Err(_)) => Err(Error::Transport(format!(
                "Presence request for {channel} aborted: connection lost"
            ))),
            Err(_) => Err(Error::Transport(format!(
                "Presence request for {channel} timed out ({timeout:?})"
            ))),
        }
    }

    pub(crate) fn subscription_state(&self, channel: &str) -> SubscriptionState {
        lock(&self.inner.shared).registry.state(channel)
    }

    /// Ask the broker again for a subscription it rejected.
    pub(crate) fn resubscribe(&self, channel: &str) -> Result<()> {
        let mut shared = lock(&self.inner.shared);
        if shared.state == ConnectionState::Closed {
            return Err(Error::ConnectionClosed);
        }
        if shared.registry.rearm(channel)? && shared.state == ConnectionState::Connected {
            self.send(Command::Subscribe(channel.to_string()))?;
        }
        Ok(())
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.inner
            .commands
            .send(cmd)
            .map_err(|_| Error::ConnectionClosed)
    }
}

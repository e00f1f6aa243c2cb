//! Events and handler sets
//!
//! Connection-level events go to an [`EventHandler`], channel-scoped events
//! to the [`SubEventHandler`] registered with the subscription. Both are
//! builders of optional callbacks; a handler set can instead forward every
//! event as an [`Event`] value over an mpsc channel.
//!
//! ```rust
//! use chatlink::client::{EventHandler, SubEventHandler};
//!
//! let events = EventHandler::new()
//!     .on_connect(|e| println!("Connected with ID {}", e.client_id))
//!     .on_disconnect(|e| println!("Disconnected: {}", e.reason));
//!
//! let sub_events = SubEventHandler::new()
//!     .on_publication(|e| println!("{} bytes on {}", e.data.len(), e.channel));
//! ```

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

pub use crate::transport::message::ClientInfo;

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectEvent {
    pub client_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisconnectEvent {
    pub reason: String,
    /// Whether the client will try to reconnect on its own.
    pub reconnect: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEvent {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublicationEvent {
    pub channel: String,
    pub data: Vec<u8>,
    /// Publisher identity, if the broker attached it.
    pub info: Option<ClientInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinEvent {
    pub channel: String,
    pub info: ClientInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaveEvent {
    pub channel: String,
    pub info: ClientInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeSuccessEvent {
    pub channel: String,
    /// Set when the ack follows a reconnect.
    pub resubscribe: bool,
    pub recovered: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeErrorEvent {
    pub channel: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnsubscribeEvent {
    pub channel: String,
}

/// Every event the client can deliver.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connect(ConnectEvent),
    Disconnect(DisconnectEvent),
    Error(ErrorEvent),
    Publication(PublicationEvent),
    Join(JoinEvent),
    Leave(LeaveEvent),
    SubscribeSuccess(SubscribeSuccessEvent),
    SubscribeError(SubscribeErrorEvent),
    Unsubscribe(UnsubscribeEvent),
}

impl Event {
    /// Channel of a channel-scoped event.
    pub fn channel(&self) -> Option<&str> {
        match self {
            Event::Connect(_) | Event::Disconnect(_) | Event::Error(_) => None,
            Event::Publication(e) => Some(&e.channel),
            Event::Join(e) => Some(&e.channel),
            Event::Leave(e) => Some(&e.channel),
            Event::SubscribeSuccess(e) => Some(&e.channel),
            Event::SubscribeError(e) => Some(&e.channel),
            Event::Unsubscribe(e) => Some(&e.channel),
        }
    }
}

type Callback<E> = Arc<dyn Fn(E) + Send + Sync>;

/// Connection-level handlers: connect, disconnect and error.
#[derive(Clone, Default)]
pub struct EventHandler {
    on_connect: Option<Callback<ConnectEvent>>,
    on_disconnect: Option<Callback<DisconnectEvent>>,
    on_error: Option<Callback<ErrorEvent>>,
    forward: Option<UnboundedSender<Event>>,
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("forward", &self.forward.is_some())
            .finish()
    }
}

impl EventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handler set that sends every connection-level event to `tx`.
    /// Callbacks registered on top of it still run.
    pub fn forward(tx: UnboundedSender<Event>) -> Self {
        Self {
            forward: Some(tx),
            ..Self::default()
        }
    }

    pub fn on_connect(mut self, f: impl Fn(ConnectEvent) + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    pub fn on_disconnect(mut self, f: impl Fn(DisconnectEvent) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(ErrorEvent) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Deliver a connection-level event. Channel-scoped events are ignored.
    pub(crate) fn emit(&self, event: Event) {
        if let Some(tx) = &self.forward {
            // receiver gone just means nobody listens anymore
            let _ = tx.send(event.clone());
        }
        match event {
            Event::Connect(e) => call(&self.on_connect, e),
            Event::Disconnect(e) => call(&self.on_disconnect, e),
            Event::Error(e) => call(&self.on_error, e),
            other => tracing::debug!("Connection handler ignores {:?}", other),
        }
    }
}

/// Subscription-level handlers.
#[derive(Clone, Default)]
pub struct SubEventHandler {
    on_publication: Option<Callback<PublicationEvent>>,
    on_join: Option<Callback<JoinEvent>>,
    on_leave: Option<Callback<LeaveEvent>>,
    on_subscribe_success: Option<Callback<SubscribeSuccessEvent>>,
    on_subscribe_error: Option<Callback<SubscribeErrorEvent>>,
    on_unsubscribe: Option<Callback<UnsubscribeEvent>>,
    forward: Option<UnboundedSender<Event>>,
}

impl fmt::Debug for SubEventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubEventHandler")
            .field("on_publication", &self.on_publication.is_some())
            .field("on_join", &self.on_join.is_some())
            .field("on_leave", &self.on_leave.is_some())
            .field("on_subscribe_success", &self.on_subscribe_success.is_some())
            .field("on_subscribe_error", &self.on_subscribe_error.is_some())
            .field("on_unsubscribe", &self.on_unsubscribe.is_some())
            .field("forward", &self.forward.is_some())
            .finish()
    }
}

impl SubEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handler set that sends every event of the subscription to `tx`.
    pub fn forward(tx: UnboundedSender<Event>) -> Self {
        Self {
            forward: Some(tx),
            ..Self::default()
        }
    }

    pub fn on_publication(mut self, f: impl Fn(PublicationEvent) + Send + Sync + 'static) -> Self {
        self.on_publication = Some(Arc::new(f));
        self
    }

    pub fn on_join(mut self, f: impl Fn(JoinEvent) + Send + Sync + 'static) -> Self {
        self.on_join = Some(Arc::new(f));
        self
    }

    pub fn on_leave(mut self, f: impl Fn(LeaveEvent) + Send + Sync + 'static) -> Self {
        self.on_leave = Some(Arc::new(f));
        self
    }

    pub fn on_subscribe_success(
        mut self,
        f: impl Fn(SubscribeSuccessEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_subscribe_success = Some(Arc::new(f));
        self
    }

    pub fn on_subscribe_error(
        mut self,
        f: impl Fn(SubscribeErrorEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_subscribe_error = Some(Arc::new(f));
        self
    }

    pub fn on_unsubscribe(mut self, f: impl Fn(UnsubscribeEvent) + Send + Sync + 'static) -> Self {
        self.on_unsubscribe = Some(Arc::new(f));
        self
    }

    /// Deliver a channel-scoped event. Connection-level events are ignored.
    pub(crate) fn emit(&self, event: Event) {
        if let Some(tx) = &self.forward {
            let _ = tx.send(event.clone());
        }
        match event {
            Event::Publication(e) => call(&self.on_publication, e),
            Event::Join(e) => call(&self.on_join, e),
            Event::Leave(e) => call(&self.on_leave, e),
            Event::SubscribeSuccess(e) => call(&self.on_subscribe_success, e),
            Event::SubscribeError(e) => call(&self.on_subscribe_error, e),
            Event::Unsubscribe(e) => call(&self.on_unsubscribe, e),
            other => tracing::debug!("Subscription handler ignores {:?}", other),
        }
    }
}

fn call<E>(cb: &Option<Callback<E>>, event: E) {
    if let Some(cb) = cb {
        cb(event);
    }
}

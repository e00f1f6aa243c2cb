//! Event dispatcher
//!
//! Turns decoded broker frames into events and hands each one to exactly
//! one handler set: connection-level frames to the client's
//! [`EventHandler`], channel-scoped frames to the handler set of the
//! matching registry entry.
//!
//! The shared lock is only held while the registry is updated; handlers run
//! after it is released so they can freely call back into the client.
//! Nothing is delivered once the client is closed.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::client::events::{
    ErrorEvent, Event, EventHandler, JoinEvent, LeaveEvent, PublicationEvent, SubEventHandler,
    SubscribeErrorEvent, UnsubscribeEvent,
};
use crate::transport::connection::{ConnectionState, Shared, lock};
use crate::transport::message::{self, ServerMessage};

/// What the connection should do after a frame was dispatched.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Outcome {
    Continue,
    /// The broker asked to end the session.
    Disconnect { reason: String, reconnect: bool },
}

#[derive(Clone)]
pub(crate) struct Dispatcher {
    shared: Arc<Mutex<Shared>>,
    events: EventHandler,
}

impl Dispatcher {
    pub(crate) fn new(shared: Arc<Mutex<Shared>>, events: EventHandler) -> Self {
        Self { shared, events }
    }

    /// Decode and dispatch one text frame. A frame that fails to decode is
    /// reported as an `Error` event; the session carries on.
    pub(crate) fn dispatch_text(&self, text: &str) -> Outcome {
        match message::decode(text) {
            Ok(frame) => self.dispatch(frame),
            Err(e) => {
                warn!("Dropping malformed frame: {}", e);
                self.emit(Event::Error(ErrorEvent {
                    message: e.to_string(),
                }));
                Outcome::Continue
            }
        }
    }

    pub(crate) fn dispatch(&self, frame: ServerMessage) -> Outcome {
        match frame {
            ServerMessage::Connected { client } => {
                warn!("Unexpected connected frame for {} mid-session", client);
                self.emit(Event::Error(ErrorEvent {
                    message: "unexpected connected frame".to_string(),
                }));
            }
            ServerMessage::Error { message } => {
                self.emit(Event::Error(ErrorEvent { message }));
            }
            ServerMessage::Disconnect { reason, reconnect } => {
                return Outcome::Disconnect { reason, reconnect };
            }
            ServerMessage::Subscribed { channel, recovered } => {
                let acked = lock(&self.shared).registry.acknowledge(&channel, recovered);
                match acked {
                    Some((handler, event)) => {
                        self.emit_to(&handler, Event::SubscribeSuccess(event));
                    }
                    None => debug!("Ignoring subscribe ack for {}", channel),
                }
            }
            ServerMessage::SubscribeError { channel, error } => {
                let rejected = lock(&self.shared).registry.reject(&channel);
                match rejected {
                    Some(handler) => {
                        warn!("Subscription to {} rejected: {}", channel, error);
                        self.emit_to(
                            &handler,
                            Event::SubscribeError(SubscribeErrorEvent { channel, error }),
                        );
                    }
                    None => debug!("Ignoring subscribe error for {}", channel),
                }
            }
            ServerMessage::Unsubscribed { channel } => {
                // acks of our own unsubscribe are consumed here: the entry is
                // already gone and a new one for the channel may exist
                let removed = {
                    let mut shared = lock(&self.shared);
                    if shared.take_unsubscribe_ack(&channel) {
                        None
                    } else {
                        shared.registry.remove(&channel).ok()
                    }
                };
                match removed {
                    Some(handler) => {
                        self.emit_to(&handler, Event::Unsubscribe(UnsubscribeEvent { channel }));
                    }
                    None => debug!("Unsubscribe of {} acknowledged", channel),
                }
            }
            ServerMessage::Presence { channel, clients } => {
                let reply = lock(&self.shared).take_presence(&channel);
                match reply {
                    Some(reply) => {
                        // the caller may have given up waiting
                        let _ = reply.send(clients);
                    }
                    None => debug!("Ignoring unsolicited presence for {}", channel),
                }
            }
            ServerMessage::Publication {
                channel,
                data,
                info,
            } => {
                self.route(Event::Publication(PublicationEvent {
                    channel,
                    data,
                    info,
                }));
            }
            ServerMessage::Join { channel, info } => {
                self.route(Event::Join(JoinEvent { channel, info }));
            }
            ServerMessage::Leave { channel, info } => {
                self.route(Event::Leave(LeaveEvent { channel, info }));
            }
        }
        Outcome::Continue
    }

    /// Deliver a channel-scoped event to the subscription it belongs to.
    fn route(&self, event: Event) {
        let Some(channel) = event.channel().map(str::to_string) else {
            return;
        };
        let handler = lock(&self.shared).registry.handler(&channel);
        match handler {
            Some(handler) => self.emit_to(&handler, event),
            None => debug!("No subscription for channel {}", channel),
        }
    }

    /// Deliver a connection-level event.
    pub(crate) fn emit(&self, event: Event) {
        if self.is_closed() {
            return;
        }
        self.events.emit(event);
    }

    pub(crate) fn emit_to(&self, handler: &SubEventHandler, event: Event) {
        if self.is_closed() {
            return;
        }
        handler.emit(event);
    }

    fn is_closed(&self) -> bool {
        lock(&self.shared).state == ConnectionState::Closed
    }
}

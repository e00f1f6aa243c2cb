//! The `client` module is the application-facing side of the library.
//!
//! - `pubsub_client`: the [`Client`] facade (connect, subscribe, publish, close)
//! - `subscription`: per-channel [`Subscription`] handles
//! - `registry`: channel name → subscription state and handlers
//! - `dispatcher`: routes decoded frames to the right handler set
//! - `events`: event types and handler builders
//! - `credentials`: optional connect credentials

pub mod credentials;
pub(crate) mod dispatcher;
pub mod events;
pub mod pubsub_client;
pub(crate) mod registry;
pub mod subscription;

pub use credentials::Credentials;
pub use events::{
    ClientInfo, ConnectEvent, DisconnectEvent, ErrorEvent, Event, EventHandler, JoinEvent,
    LeaveEvent, PublicationEvent, SubEventHandler, SubscribeErrorEvent, SubscribeSuccessEvent,
    UnsubscribeEvent,
};
pub use pubsub_client::Client;
pub use registry::SubscriptionState;
pub use subscription::{PresenceData, Subscription};

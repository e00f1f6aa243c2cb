//! # chatlink
//!
//! `chatlink` is a small publish/subscribe client for a WebSocket message
//! broker, plus a terminal chat built on top of it.
//!
//! One [`Client`](client::Client) keeps one connection to the broker in a
//! background task, reconnecting with backoff when it drops and
//! resubscribing every channel in the order it was registered. Inbound
//! frames are delivered to handler sets in arrival order; application code
//! publishes from any task.
//!
//! ```rust,no_run
//! use chatlink::client::{Client, EventHandler, SubEventHandler};
//! use chatlink::config::ClientSettings;
//!
//! # async fn run() -> chatlink::utils::Result<()> {
//! let events = EventHandler::new().on_connect(|e| println!("Connected as {}", e.client_id));
//! let client = Client::new(ClientSettings::default(), events);
//!
//! let sub = client.subscribe(
//!     "chat:index",
//!     SubEventHandler::new().on_publication(|e| println!("{:?}", e.data)),
//! )?;
//! client.connect()?;
//! // once subscribed:
//! let _ = sub.publish(br#"{"input":"hello"}"#.to_vec());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - `client`: the client facade, subscriptions, registry and event handlers.
//! - `config`: loading settings from files and environment.
//! - `transport`: wire frames, WebSocket handshake and the connection task.
//! - `utils`: error type and logging setup.

pub mod client;
pub mod config;
pub mod transport;
pub mod utils;

pub use client::{Client, Subscription};
pub use utils::{Error, Result};

//! The `transport` module owns the network side of the client.
//!
//! It defines the JSON frames exchanged with the broker, opens the
//! WebSocket and performs the connect handshake, and runs the background
//! task that keeps the connection alive and moves frames in both directions.

pub mod connection;
pub mod message;
pub mod websocket;

pub use connection::ConnectionState;
pub use message::{ClientMessage, ServerMessage};

#[cfg(test)]
mod tests;

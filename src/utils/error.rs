//! Error types for the client library.
//!
//! Transport and protocol faults that happen inside the background
//! connection task never reach the caller as `Err`; they are recovered
//! (reconnect, skip frame) and surfaced as `Error`/`Disconnect` events.
//! The variants below are what synchronous calls can return.

use thiserror::Error;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Connect, read or write failure, or an unusable endpoint
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed or unexpected frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Already subscribed to channel {0}")]
    DuplicateSubscription(String),

    #[error("Not subscribed to channel {0}")]
    NotSubscribed(String),

    /// Returned by every operation attempted after `close`
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl Error {
    /// Whether the error is caused by how the caller used the client rather
    /// than by the network or the broker.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            Error::DuplicateSubscription(_) | Error::NotSubscribed(_) | Error::ConnectionClosed
        )
    }
}

impl From<tungstenite::Error> for Error {
    fn from(e: tungstenite::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Protocol(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_misuse_classification() {
        assert!(Error::NotSubscribed("a".into()).is_misuse());
        assert!(Error::DuplicateSubscription("a".into()).is_misuse());
        assert!(Error::ConnectionClosed.is_misuse());
        assert!(!Error::Transport("refused".into()).is_misuse());
        assert!(!Error::Protocol("bad frame".into()).is_misuse());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Error::NotSubscribed("chat:index".into()).to_string(),
            "Not subscribed to channel chat:index"
        );
        assert_eq!(Error::ConnectionClosed.to_string(), "Connection closed");
    }

    #[test]
    fn test_json_error_is_protocol() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(Error::from(err), Error::Protocol(_)));
    }
}

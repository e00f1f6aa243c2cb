//! Connection credentials
//!
//! Credentials are issued by the application backend and handed to the
//! client unchanged; the client never signs anything itself. They travel in
//! the `connect` frame when present.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Credentials {
    /// Application user id, empty for anonymous users.
    pub user: String,
    /// Unix seconds the credentials were issued at, as a string.
    pub timestamp: String,
    /// Opaque extra connection info.
    #[serde(default)]
    pub info: String,
    /// Token (signature) trusted by the broker.
    pub token: String,
}

impl Credentials {
    pub fn new(
        user: impl Into<String>,
        timestamp: impl Into<String>,
        info: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            timestamp: timestamp.into(),
            info: info.into(),
            token: token.into(),
        }
    }
}

/// Current Unix time in seconds, formatted the way credentials expect it.
pub fn timestamp() -> String {
    chrono::Utc::now().timestamp().to_string()
}

/// Unix time `secs` seconds from now, for expiring credentials.
pub fn expires_in(secs: i64) -> String {
    (chrono::Utc::now() + chrono::Duration::seconds(secs))
        .timestamp()
        .to_string()
}

//! Subscription handle
//!
//! Returned by `Client::subscribe`. The handle is only a name plus a client
//! clone; the state lives in the client's registry, so a handle outliving
//! its subscription simply reports `Unsubscribed` and fails to publish.

use crate::client::events::ClientInfo;
use crate::client::pubsub_client::Client;
use crate::client::registry::SubscriptionState;
use crate::utils::Result;

/// Clients currently subscribed to a channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceData {
    pub clients: Vec<ClientInfo>,
}

#[derive(Debug, Clone)]
pub struct Subscription {
    client: Client,
    channel: String,
}

impl Subscription {
    pub(crate) fn new(client: Client, channel: &str) -> Self {
        Self {
            client,
            channel: channel.to_string(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn state(&self) -> SubscriptionState {
        self.client.subscription_state(&self.channel)
    }

    /// Queue `data` for the channel; see [`Client::publish`].
    pub fn publish(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.client.publish(&self.channel, data)
    }

    /// Retry a subscription the broker rejected. No-op while subscribing or
    /// subscribed.
    pub fn subscribe(&self) -> Result<()> {
        self.client.resubscribe(&self.channel)
    }

    /// See [`Client::presence`].
    pub async fn presence(&self) -> Result<PresenceData> {
        self.client.presence(&self.channel).await
    }

    pub fn unsubscribe(&self) -> Result<()> {
        self.client.unsubscribe(&self.channel)
    }
}

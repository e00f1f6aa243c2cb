//! Subscription registry
//!
//! Maps channel names to their subscription state and handler set. The
//! registry is plain synchronous data; callers hold the client's shared lock
//! while touching it and release it before running any handler.
//!
//! Entries remember their registration sequence so that requests after a
//! reconnect go out in the order the application subscribed. Each subscribe
//! request is stamped with the connection epoch it was sent in, which keeps
//! the same request from being sent twice within one session.

use std::collections::HashMap;

use crate::client::events::{SubEventHandler, SubscribeSuccessEvent};
use crate::utils::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Not (or no longer) registered.
    Unsubscribed,
    /// Registered, waiting for the broker to acknowledge.
    Subscribing,
    Subscribed,
    /// Rejected by the broker.
    Failed,
}

#[derive(Debug)]
struct Entry {
    state: SubscriptionState,
    handler: SubEventHandler,
    seq: u64,
    requested_epoch: Option<u64>,
    resubscribe: bool,
}

#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `channel` in the `Subscribing` state.
    pub fn insert(&mut self, channel: &str, handler: SubEventHandler) -> Result<()> {
        if self.entries.contains_key(channel) {
            return Err(Error::DuplicateSubscription(channel.to_string()));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            channel.to_string(),
            Entry {
                state: SubscriptionState::Subscribing,
                handler,
                seq,
                requested_epoch: None,
                resubscribe: false,
            },
        );
        Ok(())
    }

    /// Drop `channel`, handing back its handler set.
    pub fn remove(&mut self, channel: &str) -> Result<SubEventHandler> {
        self.entries
            .remove(channel)
            .map(|entry| entry.handler)
            .ok_or_else(|| Error::NotSubscribed(channel.to_string()))
    }

    pub fn state(&self, channel: &str) -> SubscriptionState {
        self.entries
            .get(channel)
            .map_or(SubscriptionState::Unsubscribed, |entry| entry.state)
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.entries.contains_key(channel)
    }

    pub fn handler(&self, channel: &str) -> Option<SubEventHandler> {
        self.entries.get(channel).map(|entry| entry.handler.clone())
    }

    /// Channels in registration order.
    pub fn channels(&self) -> Vec<String> {
        let mut entries: Vec<(&String, &Entry)> = self.entries.iter().collect();
        entries.sort_by_key(|(_, entry)| entry.seq);
        entries.into_iter().map(|(name, _)| name.clone()).collect()
    }

    /// Channels that still need a subscribe request in session `epoch`, in
    /// registration order. They are marked as requested.
    pub fn take_pending(&mut self, epoch: u64) -> Vec<String> {
        let mut pending: Vec<(u64, String)> = self
            .entries
            .iter_mut()
            .filter(|(_, entry)| {
                entry.state == SubscriptionState::Subscribing
                    && entry.requested_epoch != Some(epoch)
            })
            .map(|(name, entry)| {
                entry.requested_epoch = Some(epoch);
                (entry.seq, name.clone())
            })
            .collect();
        pending.sort();
        pending.into_iter().map(|(_, name)| name).collect()
    }

    /// Mark a single request for session `epoch`. Returns `false` when
    /// nothing should be sent.
    pub fn mark_requested(&mut self, channel: &str, epoch: u64) -> bool {
        match self.entries.get_mut(channel) {
            Some(entry)
                if entry.state == SubscriptionState::Subscribing
                    && entry.requested_epoch != Some(epoch) =>
            {
                entry.requested_epoch = Some(epoch);
                true
            }
            _ => false,
        }
    }

    /// The connection dropped: active subscriptions must be requested again.
    pub fn connection_lost(&mut self) {
        for entry in self.entries.values_mut() {
            if entry.state == SubscriptionState::Subscribed {
                entry.state = SubscriptionState::Subscribing;
                entry.resubscribe = true;
            }
        }
    }

    /// Broker acknowledged the subscription.
    pub fn acknowledge(
        &mut self,
        channel: &str,
        recovered: bool,
    ) -> Option<(SubEventHandler, SubscribeSuccessEvent)> {
        let entry = self.entries.get_mut(channel)?;
        if entry.state != SubscriptionState::Subscribing {
            return None;
        }
        entry.state = SubscriptionState::Subscribed;
        let event = SubscribeSuccessEvent {
            channel: channel.to_string(),
            resubscribe: std::mem::take(&mut entry.resubscribe),
            recovered,
        };
        Some((entry.handler.clone(), event))
    }

    /// Broker rejected the subscription.
    pub fn reject(&mut self, channel: &str) -> Option<SubEventHandler> {
        let entry = self.entries.get_mut(channel)?;
        if entry.state != SubscriptionState::Subscribing {
            return None;
        }
        entry.state = SubscriptionState::Failed;
        Some(entry.handler.clone())
    }

    /// Move a failed subscription back to `Subscribing`. Returns whether a
    /// new request is needed.
    pub fn rearm(&mut self, channel: &str) -> Result<bool> {
        let entry = self
            .entries
            .get_mut(channel)
            .ok_or_else(|| Error::NotSubscribed(channel.to_string()))?;
        if entry.state != SubscriptionState::Failed {
            return Ok(false);
        }
        entry.state = SubscriptionState::Subscribing;
        entry.requested_epoch = None;
        Ok(true)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

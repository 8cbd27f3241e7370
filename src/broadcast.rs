// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Fan-out from an accepted event to every matching open subscription on
//! every connected client (spec §4.7)

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::connection::{Connection, ConnectionId};
use crate::event::{match_filters, Event};
use crate::message;

/// The set of live connections, mutated on open/close and iterated by the
/// broadcast engine (spec §5, "connection registry")
#[derive(Default)]
pub struct Registry {
    connections: Mutex<HashMap<ConnectionId, Arc<Connection>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection: Arc<Connection>) {
        self.connections
            .lock()
            .unwrap()
            .insert(connection.id, connection);
    }

    pub fn unregister(&self, id: ConnectionId) {
        if let Some(connection) = self.connections.lock().unwrap().remove(&id) {
            connection.shutdown();
        }
    }

    pub fn len(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.lock().unwrap().values().cloned().collect()
    }
}

/// Iterate every connection's open subscriptions and deliver `event` to the
/// ones whose filters match (spec §4.7). Returns the number of deliveries
/// made.
///
/// The event is serialized once for the whole broadcast; each matching
/// subscription reuses its own pre-serialized, JSON-quoted id to build the
/// `EVENT` frame without re-escaping anything.
pub fn deliver(registry: &Registry, event: &Event) -> usize {
    let event_json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(_) => return 0,
    };

    let mut delivered = 0usize;
    for connection in registry.snapshot() {
        let subscriptions: Vec<_> = connection
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .cloned()
            .collect();

        for subscription in subscriptions {
            if !prefilter_probe(&subscription, event) {
                continue;
            }
            if !match_filters(&subscription.filters, event) {
                continue;
            }
            connection.send(message::cached_event_frame(
                &subscription.subid_json,
                &event_json,
            ));
            delivered += 1;
        }
    }
    delivered
}

/// Probabilistic prefilter (spec §4.3, §4.7): when a subscription has a
/// membership filter, test the event id, the pubkey, and each tag value's
/// first component; proceed to the exact match only when at least one probe
/// returns true. A subscription without a filter (too broad to prefilter)
/// always proceeds to the exact match.
fn prefilter_probe(subscription: &crate::connection::Subscription, event: &Event) -> bool {
    let Some(bloom) = &subscription.bloom else {
        return true;
    };

    if bloom.contains(&event.id.to_hex()) {
        return true;
    }
    if bloom.contains(&event.pubkey.to_hex()) {
        return true;
    }
    event.tags.iter().any(|tag| match tag.value() {
        Some(value) => bloom.contains(value),
        None => false,
    })
}

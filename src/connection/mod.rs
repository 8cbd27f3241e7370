// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Per-connection state (spec §3 "Connection state", §4.6)

mod session;
pub mod router;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rand::RngCore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bloom::BloomFilter;
use crate::event::{Filter, PublicKey};
use crate::reconcile::ReconciliationSession;

pub(crate) use session::{RateLimiterResponse, Tokens};

/// Identifies a live connection within the broadcast [`crate::broadcast::Registry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next connection id. Monotonically increasing, process-wide.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A live subscription registered by `REQ` (spec §3 "Subscription")
pub struct Subscription {
    /// The client's ordered filter list (disjunctive: any filter may match)
    pub filters: Vec<Filter>,
    /// Precomputed membership filter (spec §4.3), absent when the
    /// subscription is too broad to prefilter
    pub bloom: Option<BloomFilter>,
    /// The subscription id, pre-serialized as a JSON-quoted string so the
    /// broadcast hot path never re-escapes it (spec §3, §4.7)
    pub subid_json: String,
    /// Cancels the subscription's historical-event stream and, once set,
    /// further live delivery
    pub cancel: CancellationToken,
}

impl Subscription {
    pub fn new(filters: Vec<Filter>, subid: &str) -> Self {
        Self {
            bloom: crate::bloom::build_subscription_filter(&filters),
            filters,
            subid_json: serde_json::to_string(subid).unwrap_or_else(|_| "\"\"".to_string()),
            cancel: CancellationToken::new(),
        }
    }
}

/// Authentication state for a connection (NIP-42)
#[derive(Default)]
struct AuthState {
    challenge: String,
    pubkey: Option<PublicKey>,
}

/// Per-connection record (spec §3 "Connection state")
///
/// Shared (via `Arc`) between the connection's own read loop and the
/// broadcast engine, which reaches every live connection's subscriptions to
/// decide whether to deliver a newly accepted event.
pub struct Connection {
    pub id: ConnectionId,
    /// Outbound frames, drained by the connection's single writer task so
    /// that replies and broadcast deliveries are never interleaved out of
    /// the order they were produced (spec §5, per-connection ordering)
    pub sender: mpsc::UnboundedSender<String>,
    pub subscriptions: Mutex<HashMap<String, std::sync::Arc<Subscription>>>,
    pub reconciliations: Mutex<HashMap<String, ReconciliationSession>>,
    auth: Mutex<AuthState>,
    pub relay_url: String,
    tokens: Mutex<Tokens>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        sender: mpsc::UnboundedSender<String>,
        relay_url: String,
        rate_limit_tokens: u32,
    ) -> Self {
        Self {
            id,
            sender,
            subscriptions: Mutex::new(HashMap::new()),
            reconciliations: Mutex::new(HashMap::new()),
            auth: Mutex::new(AuthState {
                challenge: generate_challenge(),
                pubkey: None,
            }),
            relay_url,
            tokens: Mutex::new(Tokens::new(rate_limit_tokens)),
        }
    }

    pub fn challenge(&self) -> String {
        self.auth.lock().unwrap().challenge.clone()
    }

    pub fn authenticated_pubkey(&self) -> Option<PublicKey> {
        self.auth.lock().unwrap().pubkey
    }

    pub fn set_authenticated_pubkey(&self, pubkey: PublicKey) {
        self.auth.lock().unwrap().pubkey = Some(pubkey);
    }

    /// A flat per-connection events-per-minute token bucket (ambient numeric
    /// rate limit, SPEC_FULL §4.6)
    pub fn check_rate_limit(&self, max_per_minute: u32) -> RateLimiterResponse {
        self.tokens.lock().unwrap().check(max_per_minute)
    }

    /// Send a single pre-serialized frame to this connection's writer task.
    /// A closed receiver (connection gone) is not an error at this layer;
    /// the caller's own read loop will observe the disconnect and tear down.
    pub fn send(&self, frame: String) {
        let _ = self.sender.send(frame);
    }

    /// Cancel every subscription stream and reconciliation session. Called
    /// once, right before the connection record is dropped (spec §3).
    pub fn shutdown(&self) {
        for sub in self.subscriptions.lock().unwrap().values() {
            sub.cancel.cancel();
        }
        for session in self.reconciliations.lock().unwrap().values() {
            session.cancel.cancel();
        }
    }
}

/// A fresh 128-bit random challenge, rendered as lowercase hex (spec §4.6)
fn generate_challenge() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

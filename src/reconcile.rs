// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Range-based set-reconciliation sessions (spec §4.5)
//!
//! Wraps the external `negentropy` codec exactly as it is constructed and
//! driven in `nostr-relay-builder/src/local/inner.rs`'s NEG-OPEN/NEG-MSG
//! handling: a `NegentropyStorageVector` is filled with `(timestamp, id)`
//! pairs and sealed, then wrapped in a `Negentropy` instance bound to a
//! frame-size cap. `reconcile_with_ids` (the shape also used client-side in
//! `nostr-relay-pool/src/relay/inner.rs::sync_new`) is used in place of the
//! teacher's plain `reconcile` so the `have`/`need` id lists spec §4.5
//! requires are actually captured.

use negentropy::{Bytes, Id, Negentropy, NegentropyStorageVector};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::event::EventId;

/// The codec's frame-size cap for NEG-MSG payloads (spec §4.5)
pub const FRAME_SIZE_LIMIT: u64 = 1024 * 1024;

/// Reconciliation error, surfaced to the client as `NEG-ERR` (spec §4.5, §7)
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("{0}")]
    Codec(String),
    #[error("invalid hex message")]
    InvalidHex,
}

/// Outcome of driving one peer message through the codec
pub struct ReconcileStep {
    /// The next message to send as `NEG-MSG`, absent when reconciliation on
    /// this side has concluded
    pub next_message: Option<String>,
    /// Ids the peer indicated it already has
    pub have: Vec<EventId>,
    /// Ids the peer wants
    pub need: Vec<EventId>,
}

/// A per-subscription reconciliation session, opened by `NEG-OPEN` and
/// driven by subsequent `NEG-MSG` frames (spec §4.5, §3 "Reconciliation
/// session")
pub struct ReconciliationSession {
    codec: Negentropy<NegentropyStorageVector>,
    pub cancel: CancellationToken,
}

impl ReconciliationSession {
    /// Seal a codec instance from a frozen, sorted, de-duplicated snapshot of
    /// `(id, created_at)` pairs (spec §4.5: the snapshot is sorted ascending
    /// by `(timestamp, id)` and de-duplicated before sealing).
    pub fn open(snapshot: &[(EventId, i64)]) -> Result<Self, ReconcileError> {
        let mut storage = NegentropyStorageVector::with_capacity(snapshot.len());
        for (id, created_at) in snapshot {
            let id = Id::new(*id.as_bytes());
            storage
                .insert(*created_at as u64, id)
                .map_err(|e| ReconcileError::Codec(e.to_string()))?;
        }
        storage.seal().map_err(|e| ReconcileError::Codec(e.to_string()))?;

        let codec = Negentropy::new(storage, FRAME_SIZE_LIMIT)
            .map_err(|e| ReconcileError::Codec(e.to_string()))?;

        Ok(Self {
            codec,
            cancel: CancellationToken::new(),
        })
    }

    /// Feed one peer message (hex-encoded) through the codec.
    pub fn reconcile(&mut self, message: &str) -> Result<ReconcileStep, ReconcileError> {
        let query = Bytes::from_hex(message).map_err(|_| ReconcileError::InvalidHex)?;

        let mut have_ids: Vec<Id> = Vec::new();
        let mut need_ids: Vec<Id> = Vec::new();
        let next = self
            .codec
            .reconcile_with_ids(&query, &mut have_ids, &mut need_ids)
            .map_err(|e| ReconcileError::Codec(e.to_string()))?;

        Ok(ReconcileStep {
            next_message: next.map(|b| b.to_hex()),
            have: have_ids.iter().map(id_to_event_id).collect(),
            need: need_ids.iter().map(id_to_event_id).collect(),
        })
    }
}

fn id_to_event_id(id: &Id) -> EventId {
    EventId::from_byte_array(id.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_from_a_snapshot() {
        let id = EventId::from_byte_array([7u8; 32]);
        let snapshot = vec![(id, 100)];
        assert!(ReconciliationSession::open(&snapshot).is_ok());
    }

    #[test]
    fn opens_from_an_empty_snapshot() {
        assert!(ReconciliationSession::open(&[]).is_ok());
    }

    #[test]
    fn rejects_non_hex_messages() {
        let mut session = ReconciliationSession::open(&[]).unwrap();
        assert!(session.reconcile("not hex!!").is_err());
    }
}

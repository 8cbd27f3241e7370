// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Event model and validators (spec §3, §4.1)

use std::time::{SystemTime, UNIX_EPOCH};

use secp256k1::{schnorr, Message, XOnlyPublicKey, SECP256K1};
use serde::{Deserialize, Serialize};

use super::id::EventId;
use super::kind::Kind;
use super::pubkey::PublicKey;
use super::sig::Signature;
use super::tag::{self, Tag};

/// A signed Nostr event (spec §3)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// 32-byte event id
    pub id: EventId,
    /// Author's public key
    pub pubkey: PublicKey,
    /// Seconds since the Unix epoch
    pub created_at: i64,
    /// Event kind
    pub kind: Kind,
    /// Ordered sequence of tags
    pub tags: Vec<Tag>,
    /// Arbitrary content
    pub content: String,
    /// Schnorr signature over `id`
    pub sig: Signature,
}

/// Address of an addressable event: `(kind, pubkey, d)` (spec §3)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    /// Kind
    pub kind: Kind,
    /// Author
    pub pubkey: PublicKey,
    /// `d` tag value, `""` when absent
    pub identifier: String,
}

impl Event {
    /// Kind class helpers, forwarded from [`Kind`]
    #[inline]
    pub fn is_replaceable(&self) -> bool {
        self.kind.is_replaceable()
    }

    /// See [`Kind::is_addressable`]
    #[inline]
    pub fn is_addressable(&self) -> bool {
        self.kind.is_addressable()
    }

    /// See [`Kind::is_ephemeral`]
    #[inline]
    pub fn is_ephemeral(&self) -> bool {
        self.kind.is_ephemeral()
    }

    /// The `(kind, pubkey, d)` address, when addressable
    pub fn address(&self) -> Option<Address> {
        if !self.is_addressable() {
            return None;
        }
        Some(Address {
            kind: self.kind,
            pubkey: self.pubkey,
            identifier: tag::identifier(&self.tags).to_string(),
        })
    }

    /// Iterate values of tags whose name matches `name`
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags
            .iter()
            .filter(move |t| t.name() == Some(name))
            .filter_map(Tag::value)
    }

    /// Recompute the id from the event's fields and compare against `self.id`
    pub fn verify_id(&self) -> bool {
        let expected = EventId::new(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        );
        expected == self.id
    }

    /// Verify the schnorr signature over the event id (NIP-01)
    pub fn verify_signature(&self) -> bool {
        let Ok(xonly) = self.pubkey.xonly() else {
            return false;
        };
        let Ok(sig) = schnorr::Signature::from_slice(self.sig.as_bytes()) else {
            return false;
        };
        let msg = Message::from_digest(*self.id.as_bytes());
        verify_schnorr(&sig, &msg, &xonly)
    }
}

/// Schnorr signature verification, isolated so it can be swapped for an
/// external implementation; treated as an external primitive by spec §1/§6.
fn verify_schnorr(sig: &schnorr::Signature, msg: &Message, pubkey: &XOnlyPublicKey) -> bool {
    SECP256K1.verify_schnorr(sig, msg, pubkey).is_ok()
}

/// Reason string prefixes used across OK/CLOSED replies (spec §7), kept
/// distinct from the internal [`crate::error::Error`] type.
pub mod reason {
    /// Schema or signature failure prefix
    pub const INVALID: &str = "invalid";
    /// Proof-of-work failure prefix
    pub const POW: &str = "pow";
    /// Generic runtime/policy failure prefix
    pub const ERROR: &str = "error";
    /// NIP-42 auth-required prefix
    pub const AUTH_REQUIRED: &str = "auth-required";
    /// NIP-70 protected-event prefix
    pub const RESTRICTED: &str = "restricted";
    /// Already-known event prefix (ambient, §10 of SPEC_FULL)
    pub const DUPLICATE: &str = "duplicate";
}

/// Validate an event per spec §4.1, steps 2-4 (schema validity is a
/// precondition: the caller only holds an `Event` once it parsed, which
/// already enforces hex lengths, integer types and tag shape).
pub fn validate_event(event: &Event, min_difficulty: u8, max_tags: usize) -> Result<(), String> {
    // Step 2: proof of work
    let measured = event.id.leading_zero_bits();
    if measured < min_difficulty {
        return Err(format!(
            "{}: difficulty {} is less than {}",
            reason::POW,
            measured,
            min_difficulty
        ));
    }
    if let Some(target) = nonce_target(event) {
        if measured < target {
            return Err(format!(
                "{}: actual difficulty {} is less than target difficulty {}",
                reason::POW,
                measured,
                target
            ));
        }
    }

    // Step 3: signature. The Nostr event-signing contract binds the id to
    // the event's own fields (NIP-01), so a forged id paired with a valid
    // signature over that id is still a forgery — reject it before trusting
    // the signature at all, mirroring `nostr::Event::verify`'s recomputation
    // of the id rather than trusting the wire value.
    if !event.verify_id() {
        return Err(format!("{}: signature verification failed", reason::INVALID));
    }
    if !event.verify_signature() {
        return Err(format!("{}: signature verification failed", reason::INVALID));
    }

    // Step 4: tag count
    if event.tags.len() > max_tags {
        return Err(format!(
            "{}: too many tags (max {})",
            reason::INVALID,
            max_tags
        ));
    }

    Ok(())
}

/// Parse the third element of a `("nonce", _, target)` tag, if present
fn nonce_target(event: &Event) -> Option<u8> {
    event
        .tags
        .iter()
        .find(|t| t.name() == Some("nonce"))
        .and_then(|t| t.as_slice().get(2))
        .and_then(|v| v.parse::<u64>().ok())
        .map(|v| v.min(u8::MAX as u64) as u8)
}

/// Validate `created_at` against wall-clock bounds (spec §4.1)
pub fn validate_created_at(
    created_at: i64,
    lower_limit: i64,
    upper_limit: i64,
) -> Result<(), String> {
    let now = now_secs();
    if created_at < now - lower_limit {
        return Err(format!("{}: event is too old", reason::ERROR));
    }
    if created_at > now + upper_limit {
        return Err(format!("{}: event is too far in the future", reason::ERROR));
    }
    Ok(())
}

/// Validate a NIP-42 AUTH event (spec §4.1)
pub fn validate_auth_event(
    event: &Event,
    challenge: &str,
    relay_url: &str,
) -> Result<(), String> {
    validate_event(event, 0, usize::MAX)?;

    if event.kind != Kind::AUTHENTICATION {
        return Err(format!("{}: wrong event kind", reason::INVALID));
    }

    let now = now_secs();
    if (event.created_at - now).abs() > 600 {
        return Err(format!(
            "{}: AUTH event is too far from current time",
            reason::INVALID
        ));
    }

    let challenge_ok = event
        .tags
        .iter()
        .any(|t| t.matches("challenge", challenge));
    if !challenge_ok {
        return Err(format!("{}: invalid challenge", reason::INVALID));
    }

    let relay_ok = event
        .tag_values("relay")
        .any(|v| normalize_relay_url(v) == normalize_relay_url(relay_url));
    if !relay_ok {
        return Err(format!("{}: invalid relay", reason::INVALID));
    }

    Ok(())
}

/// Lowercase and strip a trailing slash, per spec §4.1
fn normalize_relay_url(url: &str) -> String {
    let lower = url.to_lowercase();
    lower.strip_suffix('/').map(str::to_string).unwrap_or(lower)
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

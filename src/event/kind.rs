// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Event kind and kind-class rules

use serde::{Deserialize, Serialize};

/// Event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kind(u64);

/// The four kind classes, as defined in spec §3
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindClass {
    /// `kind == 0`, `kind == 3`, or `10000 <= kind < 20000`
    Replaceable,
    /// `30000 <= kind < 40000`
    Addressable,
    /// `20000 <= kind < 30000`, never persisted
    Ephemeral,
    /// Everything else, persisted and never replaced
    Regular,
}

impl Kind {
    /// Metadata (kind 0)
    pub const METADATA: Kind = Kind(0);
    /// Text note (kind 1)
    pub const TEXT_NOTE: Kind = Kind(1);
    /// Contact list (kind 3)
    pub const CONTACTS: Kind = Kind(3);
    /// Event deletion (kind 5)
    pub const EVENT_DELETION: Kind = Kind(5);
    /// Client authentication (NIP-42, kind 22242)
    pub const AUTHENTICATION: Kind = Kind(22242);

    /// Build from a raw numeric kind
    #[inline]
    pub const fn new(kind: u64) -> Self {
        Self(kind)
    }

    /// Raw numeric value
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Classify the kind per spec §3
    pub fn class(&self) -> KindClass {
        let k = self.0;
        if k == 0 || k == 3 || (10_000..20_000).contains(&k) {
            KindClass::Replaceable
        } else if (30_000..40_000).contains(&k) {
            KindClass::Addressable
        } else if (20_000..30_000).contains(&k) {
            KindClass::Ephemeral
        } else {
            KindClass::Regular
        }
    }

    /// `true` for replaceable kinds
    #[inline]
    pub fn is_replaceable(&self) -> bool {
        self.class() == KindClass::Replaceable
    }

    /// `true` for addressable (parameterized replaceable) kinds
    #[inline]
    pub fn is_addressable(&self) -> bool {
        self.class() == KindClass::Addressable
    }

    /// `true` for ephemeral kinds: validated and broadcast, never persisted
    #[inline]
    pub fn is_ephemeral(&self) -> bool {
        self.class() == KindClass::Ephemeral
    }

    /// `true` for regular kinds: persisted, never replaced
    #[inline]
    pub fn is_regular(&self) -> bool {
        self.class() == KindClass::Regular
    }
}

impl From<u64> for Kind {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_and_contacts_are_replaceable() {
        assert!(Kind::new(0).is_replaceable());
        assert!(Kind::new(3).is_replaceable());
    }

    #[test]
    fn numeric_range_replaceable() {
        assert!(Kind::new(10_000).is_replaceable());
        assert!(Kind::new(19_999).is_replaceable());
        assert!(!Kind::new(20_000).is_replaceable());
    }

    #[test]
    fn addressable_range() {
        assert!(!Kind::new(29_999).is_addressable());
        assert!(Kind::new(30_000).is_addressable());
        assert!(Kind::new(39_999).is_addressable());
        assert!(!Kind::new(40_000).is_addressable());
    }

    #[test]
    fn ephemeral_range() {
        assert!(Kind::new(20_000).is_ephemeral());
        assert!(Kind::new(29_999).is_ephemeral());
        assert!(!Kind::new(30_000).is_ephemeral());
    }

    #[test]
    fn text_note_is_regular() {
        assert!(Kind::new(1).is_regular());
        assert!(Kind::new(5).is_regular());
        assert!(Kind::new(40_000).is_regular());
    }
}

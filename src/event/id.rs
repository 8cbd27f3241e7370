// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Event ID

use core::fmt;
use core::str::FromStr;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use super::kind::Kind;
use super::pubkey::PublicKey;
use super::tag::Tag;

/// Event ID parse error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Hex decode error
    #[error("hex: {0}")]
    Hex(#[from] hex::FromHexError),
    /// Wrong length
    #[error("invalid event id length")]
    InvalidLength,
}

/// Event ID
///
/// 32-byte sha256 hash of the serialized event data, as defined by NIP-01.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId([u8; 32]);

impl EventId {
    /// Byte length
    pub const LEN: usize = 32;

    /// Compute the id of an (unsigned) event
    pub fn new(
        pubkey: &PublicKey,
        created_at: i64,
        kind: Kind,
        tags: &[Tag],
        content: &str,
    ) -> Self {
        let json = serde_json::json!([0, pubkey, created_at, kind.as_u64(), tags, content]);
        let mut hasher = Sha256::new();
        hasher.update(json.to_string().as_bytes());
        let digest: [u8; 32] = hasher.finalize().into();
        Self(digest)
    }

    /// Build from a raw byte array
    #[inline]
    pub const fn from_byte_array(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Build from a hex-encoded slice, requiring exactly 64 chars
    pub fn from_hex<S>(hex_str: S) -> Result<Self, Error>
    where
        S: AsRef<str>,
    {
        let s = hex_str.as_ref();
        if s.len() != 64 {
            return Err(Error::InvalidLength);
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }

    /// Raw bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding
    #[inline]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Count of leading zero *bits*, per NIP-13: four per all-zero nibble,
    /// then the bit-count of the first non-zero nibble.
    pub fn leading_zero_bits(&self) -> u8 {
        let mut count: u8 = 0;
        for byte in self.0.iter() {
            if *byte == 0 {
                count = count.saturating_add(8);
            } else {
                count = count.saturating_add(byte.leading_zeros() as u8);
                return count;
            }
        }
        count
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.to_hex())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for EventId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for EventId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(DeError::custom)
    }
}

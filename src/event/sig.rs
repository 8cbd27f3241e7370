// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Schnorr signature

use core::fmt;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Signature parse error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Hex decode error
    #[error("hex: {0}")]
    Hex(#[from] hex::FromHexError),
    /// Wrong length
    #[error("invalid signature length")]
    InvalidLength,
}

/// A 64-byte schnorr signature, hex-encoded (128 chars) on the wire.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; 64]);

impl Signature {
    /// Byte length
    pub const LEN: usize = 64;

    /// Build from hex, requiring exactly 128 chars
    pub fn from_hex<S>(hex_str: S) -> Result<Self, Error>
    where
        S: AsRef<str>,
    {
        let s = hex_str.as_ref();
        if s.len() != 128 {
            return Err(Error::InvalidLength);
        }
        let mut bytes = [0u8; 64];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }

    /// Raw bytes
    #[inline]
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Lowercase hex encoding
    #[inline]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(DeError::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_length() {
        assert!(Signature::from_hex("ab").is_err());
    }
}

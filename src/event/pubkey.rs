// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Public key

use core::fmt;
use core::str::FromStr;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Public key parse error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Hex decode error
    #[error("hex: {0}")]
    Hex(#[from] hex::FromHexError),
    /// Wrong length
    #[error("invalid public key length")]
    InvalidLength,
    /// Invalid secp256k1 x-only point
    #[error("invalid secp256k1 point")]
    InvalidPoint,
}

/// A 32-byte x-only secp256k1 public key, hex-encoded on the wire.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Byte length
    pub const LEN: usize = 32;

    /// Build from raw bytes, without validating the point is on the curve
    #[inline]
    pub const fn from_byte_array(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Build from hex, requiring exactly 64 chars
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

    /// Parse as a secp256k1 x-only point, verifying it is a valid curve point
    pub fn xonly(&self) -> Result<secp256k1::XOnlyPublicKey, Error> {
        secp256k1::XOnlyPublicKey::from_slice(&self.0).map_err(|_| Error::InvalidPoint)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for PublicKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
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
    fn hex_roundtrip() {
        let pk = PublicKey::from_byte_array([9u8; 32]);
        let s = pk.to_hex();
        assert_eq!(PublicKey::from_hex(&s).unwrap(), pk);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(PublicKey::from_hex("ab").is_err());
    }
}

// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Configuration (SPEC_FULL §10.1): TOML file plus built-in defaults,
//! covering both the transport tunables of spec §6 and the NIP-11 document
//! fields advertised from them.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Runtime limits enforced by the protocol layer and advertised via NIP-11
/// (spec §6, "limitation")
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_message_length: usize,
    pub max_subscriptions: usize,
    pub max_filters: usize,
    pub max_limit: usize,
    pub max_subid_length: usize,
    pub max_tags: usize,
    pub min_pow_difficulty: u8,
    pub auth_required: bool,
    pub payment_required: bool,
    pub restricted_writes: bool,
    pub created_at_lower_limit: i64,
    pub created_at_upper_limit: i64,
    /// Ambient numeric rate limit (SPEC_FULL §10.1), 0 disables it
    pub events_per_minute: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_message_length: 65_536,
            max_subscriptions: 20,
            max_filters: 10,
            max_limit: 5_000,
            max_subid_length: 256,
            max_tags: 2_000,
            min_pow_difficulty: 0,
            auth_required: false,
            payment_required: false,
            restricted_writes: false,
            created_at_lower_limit: 60 * 60 * 24 * 365 * 10,
            created_at_upper_limit: 60 * 30,
            events_per_minute: 0,
        }
    }
}

/// NIP-11 relay-information fields (spec §6)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayInfo {
    pub name: String,
    pub description: String,
    pub pubkey: String,
    pub contact: String,
    pub supported_nips: Vec<u32>,
    pub software: String,
    pub version: String,
}

impl Default for RelayInfo {
    fn default() -> Self {
        Self {
            name: "nostr-relay".to_string(),
            description: "A Nostr relay".to_string(),
            pubkey: String::new(),
            contact: String::new(),
            supported_nips: vec![1, 9, 11, 12, 13, 15, 16, 20, 22, 33, 40, 42, 45, 70, 77],
            software: "https://github.com/rust-nostr/nostr".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Top-level configuration (spec §6, "Configuration"; SPEC_FULL §10.1)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    /// Filesystem path, or the literal `:memory:`
    pub database: String,
    pub log_level: String,
    pub relay_info: RelayInfo,
    pub limits: Limits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            database: "nostr-relay.db".to_string(),
            log_level: "info".to_string(),
            relay_info: RelayInfo::default(),
            limits: Limits::default(),
        }
    }
}

impl Config {
    /// Load from a TOML file; returns the built-in default when `path` is
    /// `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
                toml::from_str(&text)
                    .map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))
            }
            None => Ok(Self::default()),
        }
    }

    /// The NIP-11 document served on `Accept: application/nostr+json`
    /// (spec §6)
    pub fn nip11_document(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.relay_info.name,
            "description": self.relay_info.description,
            "pubkey": self.relay_info.pubkey,
            "contact": self.relay_info.contact,
            "supported_nips": self.relay_info.supported_nips,
            "software": self.relay_info.software,
            "version": self.relay_info.version,
            "limitation": {
                "max_message_length": self.limits.max_message_length,
                "max_subscriptions": self.limits.max_subscriptions,
                "max_filters": self.limits.max_filters,
                "max_limit": self.limits.max_limit,
                "max_subid_length": self.limits.max_subid_length,
                "min_pow_difficulty": self.limits.min_pow_difficulty,
                "auth_required": self.limits.auth_required,
                "payment_required": self.limits.payment_required,
                "restricted_writes": self.limits.restricted_writes,
                "created_at_lower_limit": self.limits.created_at_lower_limit,
                "created_at_upper_limit": self.limits.created_at_upper_limit,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_limits() {
        let config = Config::default();
        assert!(config.limits.max_limit > 0);
        assert!(!config.database.is_empty());
    }

    #[test]
    fn loads_partial_toml_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        fs::write(&path, "port = 9999\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.port, 9999);
        assert_eq!(config.limits.max_filters, Limits::default().max_filters);
    }

    #[test]
    fn nip11_document_carries_limitation_block() {
        let config = Config::default();
        let doc = config.nip11_document();
        assert_eq!(
            doc["limitation"]["max_message_length"],
            config.limits.max_message_length
        );
    }
}

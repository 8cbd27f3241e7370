// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Command-line arguments (SPEC_FULL §10.2)

use std::path::PathBuf;

use clap::Parser;

/// A Nostr relay
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, env = "NOSTR_RELAY_CONFIG")]
    pub config: Option<PathBuf>,
}

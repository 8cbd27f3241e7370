// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Relay error

use std::io;

use thiserror::Error;

/// Top-level relay error
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error
    #[error(transparent)]
    IO(#[from] io::Error),
    /// Storage engine error
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
    /// Websocket handshake/transport error
    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    /// HTTP error
    #[error(transparent)]
    Http(#[from] hyper::Error),
    /// Configuration error
    #[error("config: {0}")]
    Config(String),
}

/// Convenience alias
pub type Result<T, E = Error> = std::result::Result<T, E>;

// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Storage engine: a pooled SQLite-backed event store (spec §4.4)

mod cursor;
mod engine;
mod pool;
mod query;
mod schema;

pub use cursor::EventCursor;
pub use engine::Store;
pub use pool::{open_pool, Pool};
pub use query::compile_filter;

use thiserror::Error;

/// Storage engine error
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite error
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Connection pool exhausted or misconfigured
    #[error("pool: {0}")]
    Pool(#[from] r2d2::Error),
    /// A persisted row failed to decode into a well-formed event
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

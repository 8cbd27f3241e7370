// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Pooled SQLite connection manager
//!
//! Grounded in the `rusqlite` (`bundled`) + `r2d2`/`r2d2_sqlite` dependency
//! choice shared by `nostr-sqlite/Cargo.toml` and the `kofj-nostr-rs-relay`
//! manifest.

use r2d2_sqlite::SqliteConnectionManager;

use super::schema;
use super::{Result, StoreError};

/// A pooled SQLite connection handle
pub type Pool = r2d2::Pool<SqliteConnectionManager>;

/// Open (or create) the database at `path` and run migrations.
///
/// `path` may be a filesystem path or the literal `":memory:"` (spec §6
/// configuration table). WAL journaling and foreign keys are turned on for
/// every pooled connection.
pub fn open_pool(path: &str) -> Result<Pool> {
    // `SqliteConnectionManager::memory()` gives each pooled connection its
    // own private, independent database; there is no way to share a single
    // `:memory:` database across more than one connection, so the pool is
    // capped to a single connection in that mode. Harmless in practice:
    // SQLite only allows one writer at a time regardless.
    let (manager, max_size) = if path == ":memory:" {
        (SqliteConnectionManager::memory(), 1)
    } else {
        (SqliteConnectionManager::file(path), 16)
    };
    let manager = manager.with_init(|conn| {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA foreign_keys=ON;\
             PRAGMA synchronous=NORMAL;",
        )
    });

    let pool = r2d2::Pool::builder()
        .max_size(max_size)
        .build(manager)
        .map_err(StoreError::Pool)?;

    let conn = pool.get().map_err(StoreError::Pool)?;
    schema::migrate(&conn)?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_in_memory_and_migrates() {
        let pool = open_pool(":memory:").unwrap();
        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT count(*) FROM events", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}

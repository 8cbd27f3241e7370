// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Schema migrations (spec §4.4)

use rusqlite::Connection;

use super::Result;

/// Create the two base relations, their indexes, the FTS5 virtual relation,
/// and the triggers that keep the latter in sync with `events`.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS events (
            id          TEXT PRIMARY KEY,
            pubkey      TEXT NOT NULL,
            created_at  INTEGER NOT NULL,
            kind        INTEGER NOT NULL,
            content     TEXT NOT NULL,
            sig         TEXT NOT NULL,
            tags_json   TEXT NOT NULL,
            identifier  TEXT NOT NULL DEFAULT ''
        );
        CREATE INDEX IF NOT EXISTS idx_events_pubkey ON events(pubkey);
        CREATE INDEX IF NOT EXISTS idx_events_created_at ON events(created_at);
        CREATE INDEX IF NOT EXISTS idx_events_kind ON events(kind);
        CREATE INDEX IF NOT EXISTS idx_events_kind_pubkey ON events(kind, pubkey);
        CREATE INDEX IF NOT EXISTS idx_events_addressable ON events(kind, pubkey, identifier);

        CREATE TABLE IF NOT EXISTS tags (
            event_id TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
            name     TEXT NOT NULL,
            value    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tags_name_value ON tags(name, value);
        CREATE INDEX IF NOT EXISTS idx_tags_event_id ON tags(event_id);

        CREATE VIRTUAL TABLE IF NOT EXISTS events_fts USING fts5(
            id UNINDEXED,
            content
        );

        CREATE TRIGGER IF NOT EXISTS events_ad_fts AFTER DELETE ON events BEGIN
            DELETE FROM events_fts WHERE id = old.id;
        END;
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
    }
}

// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! The storage engine's public operations (spec §4.4)
//!
//! Grounded in `nostr-database/src/index.rs`'s `index_event`/`index_raw_event`
//! replacement bookkeeping, translated from an in-memory `BTreeSet` index to
//! SQL `SELECT`/`DELETE` statements that preserve the same tie-break
//! direction: `(created_at, -id)` wins.

use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, types::Value, OptionalExtension};
use tracing::warn;

use crate::event::{Event, Filter, Tag};
use crate::fts;

use super::cursor::EventCursor;
use super::pool::Pool;
use super::query::compile_filter;
use super::{Result, StoreError};

/// A handle to the storage engine, backed by a pooled SQLite database.
pub struct Store {
    pool: Pool,
    max_limit: usize,
}

/// Outcome of [`Store::save_event`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The event was inserted (replacing a prior row, if any)
    Inserted,
    /// The event's id already exists
    Duplicate,
    /// Rejected in favor of an already-retained replaceable/addressable event
    Superseded,
}

impl Store {
    /// Wrap an already-migrated pool
    pub fn new(pool: Pool, max_limit: usize) -> Self {
        Self { pool, max_limit }
    }

    /// Cheap existence probe used by the router as a duplicate fast path
    /// (SPEC_FULL §4.6, grounded in `nostr-relay-builder`'s
    /// `self.database.check_id`) so a repeat EVENT can short-circuit before
    /// the costlier signature verification.
    pub fn contains_id(&self, id: &crate::event::EventId) -> Result<bool> {
        let conn = self.pool.get()?;
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM events WHERE id = ?", params![id.to_hex()], |r| r.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// See spec §4.4, `save-event`. Ephemeral events must not reach this
    /// call; the message router skips it for them.
    pub fn save_event(&self, event: &Event) -> Result<SaveOutcome> {
        debug_assert!(!event.is_ephemeral());

        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let existing: Option<(String, i64)> = if event.is_replaceable() {
            tx.query_row(
                "SELECT id, created_at FROM events WHERE kind = ? AND pubkey = ?",
                params![event.kind.as_u64() as i64, event.pubkey.to_hex()],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?
        } else if event.is_addressable() {
            let identifier = crate::event::tag::identifier(&event.tags);
            tx.query_row(
                "SELECT id, created_at FROM events WHERE kind = ? AND pubkey = ? AND identifier = ?",
                params![event.kind.as_u64() as i64, event.pubkey.to_hex(), identifier],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?
        } else {
            None
        };

        if let Some((existing_id, existing_created_at)) = &existing {
            let candidate_loses = event.created_at < *existing_created_at
                || (event.created_at == *existing_created_at && event.id.to_hex() > *existing_id);
            if candidate_loses {
                return Ok(SaveOutcome::Superseded);
            }
            tx.execute("DELETE FROM events WHERE id = ?", params![existing_id])?;
            tx.execute("DELETE FROM events_fts WHERE id = ?", params![existing_id])?;
        }

        let identifier = if event.is_addressable() {
            crate::event::tag::identifier(&event.tags)
        } else {
            ""
        };
        let tags_json = serde_json::to_string(&event.tags).unwrap_or_default();

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO events (id, pubkey, created_at, kind, content, sig, tags_json, identifier) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                event.id.to_hex(),
                event.pubkey.to_hex(),
                event.created_at,
                event.kind.as_u64() as i64,
                event.content,
                event.sig.to_hex(),
                tags_json,
                identifier,
            ],
        )?;

        if inserted == 0 {
            tx.commit()?;
            return Ok(SaveOutcome::Duplicate);
        }

        tx.execute(
            "INSERT INTO events_fts (id, content) VALUES (?, ?)",
            params![event.id.to_hex(), fts::segment(&event.content)],
        )?;

        for tag in &event.tags {
            if !tag.is_indexed() {
                continue;
            }
            tx.execute(
                "INSERT INTO tags (event_id, name, value) VALUES (?, ?, ?)",
                params![event.id.to_hex(), tag.name(), tag.value()],
            )?;
        }

        tx.commit()?;
        Ok(SaveOutcome::Inserted)
    }

    /// See spec §4.4, `delete-events`
    pub fn delete_events(&self, pubkey: &crate::event::PublicKey, event_ids: &[String], addresses: &[String], until: i64) -> Result<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        if !event_ids.is_empty() {
            let placeholders = std::iter::repeat("?").take(event_ids.len()).collect::<Vec<_>>().join(",");
            let sql = format!("DELETE FROM events WHERE pubkey = ? AND id IN ({placeholders})");
            let mut stmt = tx.prepare(&sql)?;
            let mut bound: Vec<Value> = vec![Value::Text(pubkey.to_hex())];
            bound.extend(event_ids.iter().cloned().map(Value::Text));
            stmt.execute(rusqlite::params_from_iter(bound.iter()))?;
        }

        for address in addresses {
            let mut parts = address.splitn(3, ':');
            let (Some(kind_str), Some(addr_pubkey), Some(identifier)) =
                (parts.next(), parts.next(), parts.next())
            else {
                warn!(%address, "malformed address tag, skipping");
                continue;
            };
            if addr_pubkey != pubkey.to_hex() {
                continue;
            }
            let Ok(kind) = kind_str.parse::<i64>() else {
                warn!(%address, "malformed address kind, skipping");
                continue;
            };
            tx.execute(
                "DELETE FROM events WHERE kind = ? AND pubkey = ? AND identifier = ? AND created_at <= ?",
                params![kind, addr_pubkey, identifier, until],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// See spec §4.4, `cleanup-expired-events`
    pub fn cleanup_expired_events(&self) -> Result<usize> {
        let conn = self.pool.get()?;
        let now = now_secs();
        let deleted = conn.execute(
            "DELETE FROM events WHERE id IN (\
                SELECT event_id FROM tags WHERE name = 'expiration' AND CAST(value AS INTEGER) < ?\
             )",
            params![now],
        )?;
        Ok(deleted)
    }

    /// See spec §4.4, `count-events`. Events matched by multiple filters
    /// count multiple times, per COUNT's protocol semantics.
    pub fn count_events(&self, filters: &[Filter]) -> Result<u64> {
        let conn = self.pool.get()?;
        let now = now_secs();
        let mut total = 0u64;
        for filter in filters {
            let compiled = compile_filter(filter, now);
            let sql = format!("SELECT count(*) FROM events e WHERE {}", compiled.where_clause);
            let count: i64 = conn.query_row(&sql, rusqlite::params_from_iter(compiled.params.iter()), |r| r.get(0))?;
            total += count as u64;
        }
        Ok(total)
    }

    /// See spec §4.4, `query-events`
    pub fn query_events(&self, filter: &Filter) -> Result<EventCursor> {
        let conn = self.pool.get()?;
        let now = now_secs();
        let compiled = compile_filter(filter, now);
        let limit = filter.capped_limit(self.max_limit);
        Ok(EventCursor::new(conn, compiled.where_clause, compiled.params, limit))
    }

    /// See spec §4.4, `query-events-for-sync`. The reconciliation handler
    /// needs the whole snapshot up front (spec §4.5), so this eagerly
    /// materializes the bounded vector rather than returning a cursor.
    pub fn query_events_for_sync(&self, filter: &Filter) -> Result<Vec<(crate::event::EventId, i64)>> {
        let conn = self.pool.get()?;
        let now = now_secs();
        let compiled = compile_filter(filter, now);
        let limit = filter.capped_limit(self.max_limit);

        let sql = format!(
            "SELECT e.id, e.created_at FROM events e WHERE {} \
             ORDER BY e.created_at ASC, e.id ASC LIMIT {}",
            compiled.where_clause, limit
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(compiled.params.iter()), |r| {
            let id_hex: String = r.get(0)?;
            let created_at: i64 = r.get(1)?;
            Ok((id_hex, created_at))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id_hex, created_at) = row?;
            let id = crate::event::EventId::from_hex(&id_hex)
                .map_err(|e| StoreError::CorruptRow(e.to_string()))?;
            out.push((id, created_at));
        }
        Ok(out)
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

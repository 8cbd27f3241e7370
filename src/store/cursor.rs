// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Streaming query cursor (spec §9, "Streaming cursor")
//!
//! A prepared statement cannot outlive the borrow of its `Connection`
//! without self-referential types, so instead of holding an open
//! `rusqlite::Statement` across `next()` calls this cursor re-queries in
//! small batches using keyset pagination on `(created_at, id)`. Memory use
//! stays bounded by the batch size rather than by a single row, which keeps
//! the "one event at a time" intent of spec §4.4 while staying within safe,
//! ordinary rusqlite usage.

use std::collections::VecDeque;

use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value;

use crate::event::{Event, Tag};

use super::Result;

const BATCH_SIZE: usize = 128;

/// Lazy, `created_at DESC, id ASC` sequence of fully-hydrated events
/// (spec §4.4 `query-events`)
pub struct EventCursor {
    conn: PooledConnection<SqliteConnectionManager>,
    where_clause: String,
    params: Vec<Value>,
    remaining: usize,
    buffer: VecDeque<Event>,
    cursor: Option<(i64, String)>,
    exhausted: bool,
}

impl EventCursor {
    pub(super) fn new(
        conn: PooledConnection<SqliteConnectionManager>,
        where_clause: String,
        params: Vec<Value>,
        limit: usize,
    ) -> Self {
        Self {
            conn,
            where_clause,
            params,
            remaining: limit,
            buffer: VecDeque::new(),
            cursor: None,
            exhausted: false,
        }
    }

    fn fill(&mut self) -> Result<()> {
        if self.exhausted || self.remaining == 0 {
            return Ok(());
        }

        let batch = BATCH_SIZE.min(self.remaining);
        let mut where_clause = self.where_clause.clone();
        let mut params = self.params.clone();
        if let Some((created_at, id)) = &self.cursor {
            where_clause.push_str(
                " AND (e.created_at < ? OR (e.created_at = ? AND e.id > ?))",
            );
            params.push(Value::Integer(*created_at));
            params.push(Value::Integer(*created_at));
            params.push(Value::Text(id.clone()));
        }

        let sql = format!(
            "SELECT e.id, e.pubkey, e.created_at, e.kind, e.content, e.sig, e.tags_json \
             FROM events e WHERE {where_clause} \
             ORDER BY e.created_at DESC, e.id ASC LIMIT {batch}"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), row_to_event)?;

        let mut fetched = 0usize;
        for row in rows {
            let event = row?;
            self.cursor = Some((event.created_at, event.id.to_hex()));
            self.buffer.push_back(event);
            fetched += 1;
        }

        if fetched < batch {
            self.exhausted = true;
        }

        Ok(())
    }
}

impl Iterator for EventCursor {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        if self.buffer.is_empty() {
            if let Err(e) = self.fill() {
                return Some(Err(e));
            }
        }
        let event = self.buffer.pop_front()?;
        self.remaining -= 1;
        Some(Ok(event))
    }
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    let id_hex: String = row.get(0)?;
    let pubkey_hex: String = row.get(1)?;
    let created_at: i64 = row.get(2)?;
    let kind: i64 = row.get(3)?;
    let content: String = row.get(4)?;
    let sig_hex: String = row.get(5)?;
    let tags_json: String = row.get(6)?;

    let tags: Vec<Tag> = serde_json::from_str(&tags_json).unwrap_or_default();

    let id = crate::event::EventId::from_hex(&id_hex)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?;
    let pubkey = crate::event::PublicKey::from_hex(&pubkey_hex)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e)))?;
    let sig = crate::event::Signature::from_hex(&sig_hex)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e)))?;

    Ok(Event {
        id,
        pubkey,
        created_at,
        kind: crate::event::Kind::new(kind as u64),
        tags,
        content,
        sig,
    })
}

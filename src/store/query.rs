// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Filter-to-SQL compilation (spec §4.4, "Filter compilation")

use rusqlite::types::Value;

use crate::event::Filter;
use crate::fts;

/// A filter compiled to a `WHERE` clause fragment and its bound parameters.
///
/// Clauses whose input collection is empty are omitted entirely, so an empty
/// `ids` field means "the clause is absent", not "nothing matches".
pub struct CompiledFilter {
    /// `WHERE`-clause body (without the `WHERE` keyword), always non-empty:
    /// the expiration exclusion clause is unconditional.
    pub where_clause: String,
    /// Positional parameters, in the order their `?` placeholders appear
    pub params: Vec<Value>,
}

/// Compile `filter` against wall-clock second `now` (used for the expiration
/// exclusion clause).
pub fn compile_filter(filter: &Filter, now: i64) -> CompiledFilter {
    let mut clauses = Vec::new();
    let mut params = Vec::new();

    clauses.push(
        "e.id NOT IN (SELECT event_id FROM tags WHERE name = 'expiration' AND CAST(value AS INTEGER) < ?)"
            .to_string(),
    );
    params.push(Value::Integer(now));

    if !filter.ids.is_empty() {
        clauses.push(format!("e.id IN ({})", placeholders(filter.ids.len())));
        for id in &filter.ids {
            params.push(Value::Text(id.clone()));
        }
    }

    if !filter.authors.is_empty() {
        clauses.push(format!("e.pubkey IN ({})", placeholders(filter.authors.len())));
        for author in &filter.authors {
            params.push(Value::Text(author.to_hex()));
        }
    }

    if !filter.kinds.is_empty() {
        clauses.push(format!("e.kind IN ({})", placeholders(filter.kinds.len())));
        for kind in &filter.kinds {
            params.push(Value::Integer(kind.as_u64() as i64));
        }
    }

    if let Some(since) = filter.since {
        clauses.push("e.created_at >= ?".to_string());
        params.push(Value::Integer(since));
    }

    if let Some(until) = filter.until {
        clauses.push("e.created_at <= ?".to_string());
        params.push(Value::Integer(until));
    }

    if let Some(search) = &filter.search {
        let segmented = fts::segment(search);
        if !segmented.is_empty() {
            clauses.push(
                "e.id IN (SELECT id FROM events_fts WHERE events_fts MATCH ?)".to_string(),
            );
            params.push(Value::Text(segmented));
        }
    }

    for (name, values) in &filter.tags {
        let Some(tag_name) = name.strip_prefix('#') else {
            continue;
        };
        if values.is_empty() {
            continue;
        }
        clauses.push(format!(
            "e.id IN (SELECT event_id FROM tags WHERE name = ? AND value IN ({}))",
            placeholders(values.len())
        ));
        params.push(Value::Text(tag_name.to_string()));
        for value in values {
            params.push(Value::Text(value.clone()));
        }
    }

    CompiledFilter {
        where_clause: clauses.join(" AND "),
        params,
    }
}

fn placeholders(n: usize) -> String {
    std::iter::repeat("?").take(n).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_has_only_the_expiration_clause() {
        let compiled = compile_filter(&Filter::default(), 1000);
        assert_eq!(compiled.params.len(), 1);
        assert!(compiled.where_clause.contains("expiration"));
    }

    #[test]
    fn ids_clause_binds_one_param_per_id() {
        let mut f = Filter::default();
        f.ids.insert("a".repeat(64));
        f.ids.insert("b".repeat(64));
        let compiled = compile_filter(&f, 1000);
        assert_eq!(compiled.params.len(), 3);
        assert!(compiled.where_clause.contains("e.id IN (?,?)"));
    }

    #[test]
    fn tag_clause_binds_name_then_values() {
        let mut f = Filter::default();
        f.tags.insert(
            "#e".to_string(),
            std::collections::HashSet::from(["x".to_string(), "y".to_string()]),
        );
        let compiled = compile_filter(&f, 1000);
        assert_eq!(compiled.params.len(), 4);
        assert!(compiled.where_clause.contains("name = ? AND value IN (?,?)"));
    }
}

// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Filters (spec §3)

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::kind::Kind;
use super::model::Event;
use super::pubkey::PublicKey;

/// A conjunctive predicate over events (spec §3)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Exact event ids
    #[serde(default, skip_serializing_if = "HashSet::is_empty")]
    pub ids: HashSet<String>,
    /// Authors
    #[serde(default, skip_serializing_if = "HashSet::is_empty")]
    pub authors: HashSet<PublicKey>,
    /// Kinds
    #[serde(default, skip_serializing_if = "HashSet::is_empty")]
    pub kinds: HashSet<Kind>,
    /// Inclusive lower bound on `created_at`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,
    /// Inclusive upper bound on `created_at`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<i64>,
    /// Result cap, capped again to `max_limit` by the storage engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Free-text query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// `#<tagname>` value sets, keyed by tag name without the `#` prefix
    #[serde(flatten)]
    pub tags: BTreeMap<String, HashSet<String>>,
}

impl Filter {
    /// A filter with none of `ids`, `authors` or `#tag` keys populated: too
    /// broad to build a probabilistic prefilter for (spec §4.3)
    pub fn is_broad(&self) -> bool {
        self.ids.is_empty() && self.authors.is_empty() && self.tags.is_empty()
    }

    /// `true` when every clause is unset (matches everything)
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
            && self.authors.is_empty()
            && self.kinds.is_empty()
            && self.since.is_none()
            && self.until.is_none()
            && self.search.is_none()
            && self.tags.is_empty()
    }

    /// Cap `limit` to `max_limit`, defaulting an absent limit to `max_limit`
    pub fn capped_limit(&self, max_limit: usize) -> usize {
        self.limit.map(|l| l.min(max_limit)).unwrap_or(max_limit)
    }
}

/// `true` when every specified predicate of `filter` holds for `event`
/// (spec §3)
pub fn match_filter(filter: &Filter, event: &Event) -> bool {
    if !filter.ids.is_empty() && !filter.ids.contains(&event.id.to_hex()) {
        return false;
    }
    if !filter.authors.is_empty() && !filter.authors.contains(&event.pubkey) {
        return false;
    }
    if !filter.kinds.is_empty() && !filter.kinds.contains(&event.kind) {
        return false;
    }
    if let Some(since) = filter.since {
        if event.created_at < since {
            return false;
        }
    }
    if let Some(until) = filter.until {
        if event.created_at > until {
            return false;
        }
    }
    for (name, values) in filter.tags.iter() {
        let Some(tagname) = name.strip_prefix('#') else {
            continue;
        };
        let any_match = event
            .tag_values(tagname)
            .any(|v| values.contains(v));
        if !any_match {
            return false;
        }
    }
    // `search` is handled by the storage engine's FTS compilation; an
    // in-memory match (e.g. for broadcast) treats an event as matching only
    // when its segmented content contains the segmented query as a
    // substring, mirroring the FTS MATCH semantics (spec §4.2/§4.4).
    if let Some(query) = &filter.search {
        let segmented_query = crate::fts::segment(query);
        let segmented_content = crate::fts::segment(&event.content);
        if !segmented_query.is_empty() && !segmented_content.contains(&segmented_query) {
            return false;
        }
    }
    true
}

/// `true` when any filter of `filters` matches `event` (REQ/broadcast
/// semantics: a subscription's filters are disjunctive, spec §3)
pub fn match_filters(filters: &[Filter], event: &Event) -> bool {
    filters.iter().any(|f| match_filter(f, event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::tag::Tag;

    fn sample_event(kind: u64, pubkey: PublicKey, created_at: i64, tags: Vec<Tag>) -> Event {
        use crate::event::id::EventId;
        use crate::event::sig::Signature;
        let kind = Kind::new(kind);
        let id = EventId::new(&pubkey, created_at, kind, &tags, "content");
        Event {
            id,
            pubkey,
            created_at,
            kind,
            tags,
            content: "content".to_string(),
            sig: Signature::from_hex("0".repeat(128)).unwrap(),
        }
    }

    #[test]
    fn empty_filter_matches_all() {
        let pk = PublicKey::from_byte_array([1u8; 32]);
        let e = sample_event(1, pk, 100, vec![]);
        assert!(match_filter(&Filter::default(), &e));
    }

    #[test]
    fn author_predicate() {
        let pk = PublicKey::from_byte_array([1u8; 32]);
        let other = PublicKey::from_byte_array([2u8; 32]);
        let e = sample_event(1, pk, 100, vec![]);

        let mut f = Filter::default();
        f.authors.insert(pk);
        assert!(match_filter(&f, &e));

        let mut f2 = Filter::default();
        f2.authors.insert(other);
        assert!(!match_filter(&f2, &e));
    }

    #[test]
    fn since_until_bounds() {
        let pk = PublicKey::from_byte_array([1u8; 32]);
        let e = sample_event(1, pk, 100, vec![]);

        let mut f = Filter::default();
        f.since = Some(50);
        f.until = Some(150);
        assert!(match_filter(&f, &e));

        f.until = Some(99);
        assert!(!match_filter(&f, &e));
    }

    #[test]
    fn tag_predicate_requires_matching_value() {
        let pk = PublicKey::from_byte_array([1u8; 32]);
        let tags = vec![Tag::new(vec!["e".to_string(), "abc".to_string()])];
        let e = sample_event(1, pk, 100, tags);

        let mut f = Filter::default();
        f.tags
            .insert("#e".to_string(), HashSet::from(["abc".to_string()]));
        assert!(match_filter(&f, &e));

        let mut f2 = Filter::default();
        f2.tags
            .insert("#e".to_string(), HashSet::from(["xyz".to_string()]));
        assert!(!match_filter(&f2, &e));
    }

    #[test]
    fn is_broad_when_no_index_targeted_fields() {
        let f = Filter::default();
        assert!(f.is_broad());

        let mut f2 = Filter::default();
        f2.authors.insert(PublicKey::from_byte_array([1u8; 32]));
        assert!(!f2.is_broad());
    }

    #[test]
    fn limit_is_capped() {
        let mut f = Filter::default();
        f.limit = Some(1000);
        assert_eq!(f.capped_limit(500), 500);
        f.limit = Some(10);
        assert_eq!(f.capped_limit(500), 10);
        f.limit = None;
        assert_eq!(f.capped_limit(500), 500);
    }
}

// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Tags

use serde::{Deserialize, Serialize};

/// A single tag: an ordered sequence of strings.
///
/// Tags with fewer than two entries are kept on the event but are not
/// indexed (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(Vec<String>);

impl Tag {
    /// Build from a vector of strings
    #[inline]
    pub fn new(values: Vec<String>) -> Self {
        Self(values)
    }

    /// The tag name (`tag[0]`), if present
    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// The tag value (`tag[1]`), if present
    #[inline]
    pub fn value(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }

    /// All elements
    #[inline]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// `true` when the tag has at least a name and a value and is therefore
    /// indexed as a tag row (spec §3)
    #[inline]
    pub fn is_indexed(&self) -> bool {
        self.0.len() >= 2
    }

    /// Whether this tag's name matches `name` and whose value equals `value`
    pub fn matches(&self, name: &str, value: &str) -> bool {
        self.name() == Some(name) && self.value() == Some(value)
    }
}

impl From<Vec<String>> for Tag {
    fn from(values: Vec<String>) -> Self {
        Self(values)
    }
}

/// Build the `(kind, pubkey, d)` address identifier: the first value of the
/// first `"d"` tag, defaulting to the empty string (spec §3).
pub fn identifier<'a>(tags: &'a [Tag]) -> &'a str {
    tags.iter()
        .find(|t| t.name() == Some("d"))
        .and_then(Tag::value)
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_tag_not_indexed() {
        let t = Tag::new(vec!["e".to_string()]);
        assert!(!t.is_indexed());
    }

    #[test]
    fn two_element_tag_indexed() {
        let t = Tag::new(vec!["e".to_string(), "abc".to_string()]);
        assert!(t.is_indexed());
        assert_eq!(t.name(), Some("e"));
        assert_eq!(t.value(), Some("abc"));
    }

    #[test]
    fn identifier_defaults_to_empty() {
        let tags = vec![Tag::new(vec!["p".to_string(), "x".to_string()])];
        assert_eq!(identifier(&tags), "");
    }

    #[test]
    fn identifier_picks_first_d_tag() {
        let tags = vec![
            Tag::new(vec!["e".to_string(), "x".to_string()]),
            Tag::new(vec!["d".to_string(), "hello".to_string()]),
            Tag::new(vec!["d".to_string(), "world".to_string()]),
        ];
        assert_eq!(identifier(&tags), "hello");
    }
}

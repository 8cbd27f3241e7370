// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Probabilistic membership filter used to prefilter broadcast matching
//! (spec §4.3)

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A classical bit-array Bloom filter sized from an expected element count
/// and a target false-positive rate.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    m: usize,
    k: u32,
}

impl BloomFilter {
    /// Build a filter sized for `n` expected elements and false-positive
    /// rate `p`: `m = ceil(-n ln p / (ln 2)^2)` bits, `k = ceil((m/n) ln 2)`
    /// probes. The backing array is rounded up to a 64-bit word boundary.
    pub fn new(n: usize, p: f64) -> Self {
        let n = n.max(1);
        let m_bits = (-(n as f64) * p.ln() / (std::f64::consts::LN_2.powi(2))).ceil();
        let m = (m_bits as usize).max(1);
        let k = (((m as f64) / (n as f64)) * std::f64::consts::LN_2).ceil() as u32;
        let k = k.max(1);

        let words = m.div_ceil(64);
        Self {
            bits: vec![0u64; words],
            m: words * 64,
            k,
        }
    }

    /// Number of bits in the backing array (rounded to a word boundary)
    pub fn bit_len(&self) -> usize {
        self.m
    }

    /// Number of hash probes per operation
    pub fn probe_count(&self) -> u32 {
        self.k
    }

    /// Insert a string value
    pub fn insert(&mut self, value: &str) {
        for idx in self.probe_indices(value) {
            self.bits[idx / 64] |= 1u64 << (idx % 64);
        }
    }

    /// Membership test: returns `false` as soon as any probed bit is clear
    pub fn contains(&self, value: &str) -> bool {
        for idx in self.probe_indices(value) {
            if self.bits[idx / 64] & (1u64 << (idx % 64)) == 0 {
                return false;
            }
        }
        true
    }

    fn probe_indices(&self, value: &str) -> impl Iterator<Item = usize> + '_ {
        (0..self.k).map(move |i| (indexed_hash(value, i) as usize) % self.m)
    }
}

/// Indexed non-cryptographic 64-bit hash: the probe index is folded into the
/// hashed bytes so each probe is an independent member of the hash family.
fn indexed_hash(value: &str, index: u32) -> u64 {
    let mut hasher = DefaultHasher::new();
    index.hash(&mut hasher);
    value.hash(&mut hasher);
    hasher.finish()
}

/// Target false-positive rate used for every subscription prefilter
pub const TARGET_FP_RATE: f64 = 0.01;

/// Build a subscription's membership filter per spec §4.3: the union,
/// across all of the subscription's filters, of `ids`, `authors`, and every
/// `#<tag>` value set. If any one filter of the subscription has none of
/// those three populated, the subscription is too broad to prefilter and
/// `None` is returned (matching falls through to exact predicates).
pub fn build_subscription_filter(filters: &[crate::event::Filter]) -> Option<BloomFilter> {
    if filters.iter().any(|f| f.is_broad()) {
        return None;
    }

    let mut values: Vec<String> = Vec::new();
    for f in filters {
        values.extend(f.ids.iter().cloned());
        values.extend(f.authors.iter().map(|a| a.to_hex()));
        for set in f.tags.values() {
            values.extend(set.iter().cloned());
        }
    }

    if values.is_empty() {
        return None;
    }

    let mut bloom = BloomFilter::new(values.len(), TARGET_FP_RATE);
    for v in &values {
        bloom.insert(v);
    }
    Some(bloom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_len_rounds_to_word_boundary() {
        let f = BloomFilter::new(10, 0.01);
        assert_eq!(f.bit_len() % 64, 0);
    }

    #[test]
    fn inserted_values_are_found() {
        let mut f = BloomFilter::new(100, 0.01);
        f.insert("alice");
        f.insert("bob");
        assert!(f.contains("alice"));
        assert!(f.contains("bob"));
    }

    #[test]
    fn subscription_filter_absent_when_broad() {
        use crate::event::Filter;
        let filters = vec![Filter::default()];
        assert!(build_subscription_filter(&filters).is_none());
    }

    #[test]
    fn subscription_filter_present_when_indexed() {
        use crate::event::{Filter, PublicKey};
        let mut f = Filter::default();
        f.authors.insert(PublicKey::from_byte_array([1u8; 32]));
        let bloom = build_subscription_filter(&[f]).unwrap();
        assert!(bloom.contains(&PublicKey::from_byte_array([1u8; 32]).to_hex()));
    }

    #[test]
    fn absent_values_are_usually_rejected() {
        let mut f = BloomFilter::new(1000, 0.001);
        for i in 0..500 {
            f.insert(&format!("member-{i}"));
        }
        let false_positives = (0..1000)
            .filter(|i| f.contains(&format!("absent-{i}")))
            .count();
        // Far looser than the configured 0.1% rate; guards against a
        // probe/indexing bug rather than asserting the exact FP rate.
        assert!(false_positives < 50);
    }
}

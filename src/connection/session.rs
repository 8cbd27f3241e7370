// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Flat per-connection events-per-minute token bucket.
//!
//! An ambient, numeric rate limit: spec.md's Non-goals exclude moderation
//! and per-pubkey spam scoring, but explicitly still allow "per-pubkey rate
//! limiting beyond the configured numeric limits" to be read as *this kind*
//! of configured numeric limit (SPEC_FULL §4.6). Grounded in
//! `nostr-relay-builder/src/local/session.rs`'s `Tokens`/`RateLimiterResponse`
//! shape, generalized away from that crate's `nostr::Filter`/`SubscriptionId`
//! types this crate doesn't depend on.

use std::time::{Duration, Instant};

pub(crate) enum RateLimiterResponse {
    Allowed,
    Limited,
}

/// Tokens to keep track of a connection's event-publish rate
pub(crate) struct Tokens {
    count: u32,
    last: Option<Instant>,
}

impl Tokens {
    const MIN: Duration = Duration::from_secs(60);

    #[inline]
    pub fn new(tokens: u32) -> Self {
        Self {
            count: tokens,
            last: None,
        }
    }

    pub fn check(&mut self, max_per_minute: u32) -> RateLimiterResponse {
        if max_per_minute == 0 {
            // A configured limit of zero means "no limit enforced"
            return RateLimiterResponse::Allowed;
        }

        match self.last {
            Some(last) => {
                let now = Instant::now();
                let elapsed = (now - last).min(Self::MIN);
                self.refill(max_per_minute, elapsed);

                if self.count == 0 {
                    return RateLimiterResponse::Limited;
                }

                self.last = Some(now);
                self.count = self.count.saturating_sub(1);
                RateLimiterResponse::Allowed
            }
            None => {
                self.last = Some(Instant::now());
                self.count = self.count.saturating_sub(1);
                RateLimiterResponse::Allowed
            }
        }
    }

    fn refill(&mut self, max_per_minute: u32, elapsed: Duration) {
        let fraction = elapsed.as_secs_f64() / Self::MIN.as_secs_f64();
        let replenished = (fraction * max_per_minute as f64).floor() as u32;
        self.count = self.count.saturating_add(replenished).min(max_per_minute);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_limit_disables_throttling() {
        let mut tokens = Tokens::new(0);
        for _ in 0..1000 {
            assert!(matches!(tokens.check(0), RateLimiterResponse::Allowed));
        }
    }

    #[test]
    fn exhausts_and_blocks() {
        let mut tokens = Tokens::new(2);
        assert!(matches!(tokens.check(2), RateLimiterResponse::Allowed));
        assert!(matches!(tokens.check(2), RateLimiterResponse::Allowed));
        assert!(matches!(tokens.check(2), RateLimiterResponse::Limited));
    }
}

//! Point-bucket rate limiting.
//!
//! Each `(category, key)` pair owns a bucket with a fixed window that opens on
//! the first consumed point. Consuming more than the configured points inside
//! one window blocks the key for the rule's block duration. Buckets are
//! process-local; several instances behind a load balancer each enforce their
//! own budget.
//!
//! Time is read from [`tokio::time::Instant`] so tests can drive the clock with
//! `tokio::time::pause`/`advance`.

use std::fmt;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::AuthResult;
use crate::config::RateLimitSettings;
use crate::error::AuthError;

/// Independent throttling buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitCategory {
    /// Login attempts, keyed by identifier.
    Login,
    /// Refresh attempts, keyed by refresh-token jti.
    Refresh,
    /// Verification code requests/confirmations, keyed by mobile or email.
    Verification,
    /// Two-factor code attempts, keyed by user id.
    TwoFactor,
}

impl RateLimitCategory {
    /// Every category, in configuration order.
    pub const ALL: [Self; 4] = [
        Self::Login,
        Self::Refresh,
        Self::Verification,
        Self::TwoFactor,
    ];

    /// Categories cleared by [`RateLimiter::reset`].
    const IDENTITY_KEYED: [Self; 3] = [Self::Login, Self::Verification, Self::TwoFactor];

    /// Returns the configuration name of the category.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Refresh => "refresh",
            Self::Verification => "verification",
            Self::TwoFactor => "two_factor",
        }
    }
}

impl fmt::Display for RateLimitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Budget of one bucket category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RateLimitRule {
    /// Points available per window.
    pub points: u32,

    /// Window length.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,

    /// Block applied once the window budget is exceeded. Zero means the key is
    /// only throttled until the window ends.
    #[serde(with = "humantime_serde")]
    pub block_duration: Duration,
}

impl RateLimitRule {
    /// Creates a new rule.
    #[must_use]
    pub const fn new(points: u32, duration: Duration, block_duration: Duration) -> Self {
        Self {
            points,
            duration,
            block_duration,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    consumed: u32,
    window_start: Instant,
    blocked_until: Option<Instant>,
}

impl Bucket {
    fn fresh(now: Instant) -> Self {
        Self {
            consumed: 0,
            window_start: now,
            blocked_until: None,
        }
    }

    fn is_blocked(&self, now: Instant) -> bool {
        self.blocked_until.is_some_and(|until| now < until)
    }

    fn window_open(&self, rule: &RateLimitRule, now: Instant) -> bool {
        now.duration_since(self.window_start) < rule.duration
    }
}

/// In-memory point-bucket rate limiter.
///
/// Constructed once at start-up and shared behind an `Arc`. Each bucket is
/// mutated under its map shard lock, so concurrent `consume` calls for the same
/// key are serialized.
pub struct RateLimiter {
    rules: RateLimitSettings,
    buckets: DashMap<(RateLimitCategory, String), Bucket>,
}

impl RateLimiter {
    /// Creates a limiter with the given per-category rules.
    #[must_use]
    pub fn new(rules: RateLimitSettings) -> Self {
        Self {
            rules,
            buckets: DashMap::new(),
        }
    }

    /// Consumes one point from the bucket for `(category, key)`.
    ///
    /// Returns the points left in the current window.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::RateLimited` if the key is blocked or this call
    /// exceeds the window budget. The error carries the time until the key
    /// may try again.
    pub fn consume(&self, category: RateLimitCategory, key: &str) -> AuthResult<u32> {
        let rule = self.rules.rule(category);
        let now = Instant::now();

        let mut entry = self
            .buckets
            .entry((category, key.to_string()))
            .or_insert_with(|| Bucket::fresh(now));
        let bucket = entry.value_mut();

        if let Some(until) = bucket.blocked_until {
            if now < until {
                return Err(AuthError::rate_limited(category, until - now));
            }
            *bucket = Bucket::fresh(now);
        } else if !bucket.window_open(rule, now) {
            *bucket = Bucket::fresh(now);
        }

        bucket.consumed += 1;
        if bucket.consumed <= rule.points {
            return Ok(rule.points - bucket.consumed);
        }

        let retry_after = if rule.block_duration.is_zero() {
            rule.duration
                .saturating_sub(now.duration_since(bucket.window_start))
        } else {
            bucket.blocked_until = Some(now + rule.block_duration);
            rule.block_duration
        };

        tracing::warn!(
            category = %category,
            retry_after_secs = retry_after.as_secs(),
            "Rate limit exhausted"
        );

        Err(AuthError::rate_limited(category, retry_after))
    }

    /// Points left for `(category, key)` without consuming any.
    #[must_use]
    pub fn remaining(&self, category: RateLimitCategory, key: &str) -> u32 {
        let rule = self.rules.rule(category);
        let now = Instant::now();

        match self.buckets.get(&(category, key.to_string())) {
            Some(bucket) if bucket.is_blocked(now) => 0,
            Some(bucket) if bucket.blocked_until.is_none() && bucket.window_open(rule, now) => {
                rule.points.saturating_sub(bucket.consumed)
            }
            _ => rule.points,
        }
    }

    /// Clears the login, verification and two-factor buckets of `key`.
    ///
    /// Refresh buckets are keyed by token id and are never reset.
    pub fn reset(&self, key: &str) {
        for category in RateLimitCategory::IDENTITY_KEYED {
            self.buckets.remove(&(category, key.to_string()));
        }
    }

    /// Drops buckets whose window and block period are both over.
    ///
    /// Returns the number of buckets removed.
    pub fn purge_stale(&self) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();

        self.buckets.retain(|(category, _), bucket| match bucket.blocked_until {
            Some(until) => now < until,
            None => bucket.window_open(self.rules.rule(*category), now),
        });

        let purged = before.saturating_sub(self.buckets.len());
        if purged > 0 {
            tracing::debug!(purged, "Purged stale rate-limit buckets");
        }
        purged
    }

    /// Number of tracked buckets.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

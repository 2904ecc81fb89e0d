//! Token bucket used for per-channel admission control.

use std::time::Instant;

use crate::types::RateLimit;

/// A fractional token bucket.
///
/// The bucket starts unseeded; the first refill fills it to capacity so a
/// freshly registered channel does not stall.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    /// Current tokens available, always within `0..=capacity`.
    tokens: f64,
    /// Last time tokens were refilled. `None` until the first refill.
    last_refill: Option<Instant>,
    /// Tokens added per second.
    rate: f64,
    /// Maximum tokens (burst size).
    capacity: f64,
}

impl TokenBucket {
    /// Creates a bucket from a rate limit.
    #[must_use]
    pub fn new(limit: RateLimit) -> Self {
        Self {
            tokens: 0.0,
            last_refill: None,
            rate: limit.tokens_per_second.max(0.0),
            capacity: limit.effective_burst().max(0.0),
        }
    }

    /// Applies a new rate limit, clamping held tokens to the new capacity.
    pub fn reconfigure(&mut self, limit: RateLimit) {
        self.rate = limit.tokens_per_second.max(0.0);
        self.capacity = limit.effective_burst().max(0.0);
        self.tokens = self.tokens.min(self.capacity);
    }

    fn refill(&mut self, now: Instant) {
        match self.last_refill {
            None => self.tokens = self.capacity,
            Some(last) => {
                let elapsed = now.saturating_duration_since(last).as_secs_f64();
                self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
            }
        }
        self.last_refill = Some(now);
    }

    /// Takes one token if available.
    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Takes one token if available, using `now` as the current time.
    pub fn try_acquire_at(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens currently held (without refilling).
    #[must_use]
    pub const fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Maximum tokens the bucket can hold.
    #[must_use]
    pub const fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Refill rate in tokens per second.
    #[must_use]
    pub const fn rate(&self) -> f64 {
        self.rate
    }
}

//! Single-host token bucket.

use std::time::{Duration, Instant};

/// Outcome of one admission attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Admitted,
    /// Not enough tokens; try again after this long.
    Wait(Duration),
}

/// Token bucket refilled continuously at `rate` tokens per second up to `capacity`.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    tokens: f64,
    updated_at: Instant,
}

impl TokenBucket {
    /// Creates a full bucket.
    ///
    /// A positive rate with a capacity below one token could never admit
    /// anything, so capacity is raised to one in that case.
    pub fn new(rate: f64, capacity: f64, now: Instant) -> Self {
        let capacity = if rate > 0.0 { capacity.max(1.0) } else { capacity.max(0.0) };
        Self {
            rate,
            capacity,
            tokens: capacity,
            updated_at: now,
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.updated_at);
        if elapsed > Duration::ZERO {
            self.tokens = (self.tokens + elapsed.as_secs_f64() * self.rate).min(self.capacity);
            self.updated_at = now;
        }
    }

    /// Refills, then consumes one token if available.
    ///
    /// A non-positive rate disables limiting: the call is admitted without
    /// consuming anything once the bucket is empty.
    pub fn try_acquire(&mut self, now: Instant) -> Admission {
        if self.rate > 0.0 {
            self.refill(now);
        }

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Admission::Admitted;
        }

        if !(self.rate > 0.0) {
            return Admission::Admitted;
        }

        let wait = (1.0 - self.tokens) / self.rate;
        Admission::Wait(Duration::try_from_secs_f64(wait).unwrap_or(Duration::MAX))
    }
}

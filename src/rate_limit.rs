//! Token-budget rate limiting for external generation calls.
//!
//! Budgets are expressed in estimated tokens per minute. Callers ask for an estimate before
//! each stage and wait until the bucket can cover it.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, warn};

/// Throughput budget shared by every generation call
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Wait until `tokens` of budget are available and consume them.
    async fn acquire(&self, tokens: u64);
}

/// Limiter that never waits
#[derive(Debug, Default, Clone, Copy)]
pub struct UnlimitedRateLimiter;

#[async_trait]
impl RateLimiter for UnlimitedRateLimiter {
    async fn acquire(&self, _tokens: u64) {}
}

struct BucketState {
    available: f64,
    last_refill: Instant,
}

/// Continuously refilling token bucket.
///
/// Waiters are served in arrival order: the state mutex is fair and a waiter keeps it while
/// sleeping for its deficit, so a large request cannot be starved by smaller ones.
pub struct TokenBucketLimiter {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucketLimiter {
    /// Bucket holding one minute of budget, starting full
    pub fn per_minute(tokens_per_minute: u64) -> Self {
        let capacity = tokens_per_minute.max(1) as f64;
        Self {
            capacity,
            refill_per_sec: capacity / 60.0,
            state: Mutex::new(BucketState {
                available: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity as u64
    }

    /// Tokens currently in the bucket, after refill
    pub async fn available(&self) -> u64 {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        state.available.floor() as u64
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.available = (state.available + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
    }
}

#[async_trait]
impl RateLimiter for TokenBucketLimiter {
    async fn acquire(&self, tokens: u64) {
        let mut wanted = tokens as f64;
        if wanted > self.capacity {
            warn!(
                requested = tokens,
                capacity = self.capacity as u64,
                "Rate-limit request exceeds bucket capacity; clamping"
            );
            wanted = self.capacity;
        }

        let mut state = self.state.lock().await;
        loop {
            self.refill(&mut state);
            if state.available >= wanted {
                state.available -= wanted;
                return;
            }

            let deficit = wanted - state.available;
            let wait = Duration::from_secs_f64(deficit / self.refill_per_sec);
            debug!(
                requested = tokens,
                wait_ms = wait.as_millis() as u64,
                "Waiting for rate-limit budget"
            );
            sleep(wait).await;
        }
    }
}

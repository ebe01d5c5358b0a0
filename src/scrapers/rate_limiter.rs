//! Token-bucket gate for outbound REST calls.
//!
//! Burst capacity equals the per-second refill rate, so short bursts are
//! allowed up to the per-second budget.

use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

type GovernorLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

#[derive(Clone)]
pub struct RestRateLimiter {
    limiter: Arc<GovernorLimiter>,
    rate_per_second: u32,
}

impl RestRateLimiter {
    pub fn per_second(rate: u32) -> Self {
        let rate = rate.max(1);
        let quota = Quota::per_second(NonZeroU32::new(rate).expect("rate clamped to >= 1"));
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            rate_per_second: rate,
        }
    }

    /// Waits until a token is available. Every outbound request goes
    /// through here.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    pub fn rate_per_second(&self) -> u32 {
        self.rate_per_second
    }
}

impl std::fmt::Debug for RestRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestRateLimiter")
            .field("rate_per_second", &self.rate_per_second)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn zero_rate_is_clamped() {
        let limiter = RestRateLimiter::per_second(0);
        assert_eq!(limiter.rate_per_second(), 1);
    }

    #[tokio::test]
    async fn burst_up_to_rate_is_immediate() {
        let limiter = RestRateLimiter::per_second(10);
        let start = Instant::now();
        for _ in 0..10 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn exceeding_the_bucket_delays() {
        let limiter = RestRateLimiter::per_second(2);
        limiter.acquire().await;
        limiter.acquire().await;

        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(400));
    }
}

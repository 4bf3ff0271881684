//! Send Gate: a fixed-window budget on the shard's ability to [send messages].
//!
//! [send messages]: crate::Shard::send

use crate::config::DEFAULT_RATELIMIT_PER_MINUTE;
use leaky_bucket_lite::LeakyBucket;
use std::time::{Duration, Instant};

/// Interval over which the budget resets.
const WINDOW: Duration = Duration::from_secs(60);

/// Fixed-window counting semaphore gating outbound frames.
///
/// Ordinary traffic draws from a shared bucket sized to the configured
/// per-minute budget. A single permit is held in a separate, dedicated
/// bucket reserved exclusively for HEARTBEAT frames, so a saturated shared
/// bucket can never starve a heartbeat (see the heartbeat-reserved-lane
/// design decision).
#[derive(Debug)]
pub struct CommandRatelimiter {
    /// Bucket shared by ordinary outbound commands.
    bucket: LeakyBucket,
    /// Single-slot bucket reserved exclusively for HEARTBEAT frames.
    heartbeat_bucket: LeakyBucket,
}

impl CommandRatelimiter {
    /// Create a new ratelimiter with the given per-minute budget for
    /// ordinary traffic.
    pub(crate) fn new(per_minute: u32) -> Self {
        let bucket = LeakyBucket::builder()
            .max(per_minute)
            .tokens(per_minute)
            .refill_interval(WINDOW)
            .refill_amount(per_minute)
            .build();

        let heartbeat_bucket = LeakyBucket::builder()
            .max(1)
            .tokens(1)
            .refill_interval(WINDOW)
            .refill_amount(1)
            .build();

        Self {
            bucket,
            heartbeat_bucket,
        }
    }

    /// Create a ratelimiter using the default budget.
    pub(crate) fn default_budget() -> Self {
        Self::new(DEFAULT_RATELIMIT_PER_MINUTE)
    }

    /// Current number of ordinary commands still available within the
    /// window.
    pub fn available(&self) -> u32 {
        self.bucket.tokens()
    }

    /// Maximum number of ordinary commands that may be made per window.
    pub fn max(&self) -> u32 {
        self.bucket.max()
    }

    /// When the ordinary bucket will next refill.
    pub fn next_refill(&self) -> Instant {
        self.bucket.next_refill().into_std()
    }

    /// Acquire a permit for an ordinary outbound command, waiting until one
    /// is available.
    pub(crate) async fn acquire_one(&self) {
        self.bucket.acquire_one().await;
    }

    /// Acquire the reserved permit for a HEARTBEAT frame, waiting until it is
    /// available. Never contends with [`acquire_one`][`Self::acquire_one`].
    pub(crate) async fn acquire_heartbeat(&self) {
        self.heartbeat_bucket.acquire_one().await;
    }
}

#[cfg(test)]
mod tests {
    use super::CommandRatelimiter;
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(CommandRatelimiter: Debug, Send, Sync);

    #[test]
    fn default_budget_matches_configured_constant() {
        let ratelimiter = CommandRatelimiter::default_budget();
        assert_eq!(119, ratelimiter.max());
        assert_eq!(119, ratelimiter.available());
    }

    #[tokio::test]
    async fn heartbeat_lane_is_independent_of_ordinary_budget() {
        let ratelimiter = CommandRatelimiter::new(0);

        // The ordinary bucket is exhausted, but the heartbeat lane still has
        // its own reserved permit.
        assert_eq!(0, ratelimiter.available());
        ratelimiter.acquire_heartbeat().await;
    }
}

use std::time::Duration;

use tokio::time::Instant;

use super::bucket::TokenBucket;
use super::key::DomainKey;
use super::stats::{StatsAccumulator, StatsSnapshot};
use crate::Result;
use crate::ratelimit::{LimitConfig, WaitContext};

/// Represents a single domain with its own token bucket and statistics.
///
/// The bucket and the statistics are created together and replaced together
/// when the domain is reconfigured. Callers that captured an `Arc<Domain>`
/// before a reconfiguration finish against the old instance.
#[derive(Debug)]
pub struct Domain {
    /// The domain this instance manages
    pub key: DomainKey,

    /// Rate limiter using token bucket algorithm
    bucket: TokenBucket,

    /// Request statistics
    stats: StatsAccumulator,
}

impl Domain {
    /// Create a new Domain with a full bucket and empty statistics
    #[must_use]
    pub fn new(key: DomainKey, config: LimitConfig) -> Self {
        Domain {
            key,
            bucket: TokenBucket::new(config),
            stats: StatsAccumulator::new(),
        }
    }

    /// Wait for `permits` and record the outcome in the statistics
    ///
    /// Returns how long the caller actually waited. A request counts as
    /// delayed only if the bucket could not grant it immediately.
    ///
    /// # Errors
    ///
    /// See [`TokenBucket::acquire`]. Failed waits are not recorded.
    pub async fn acquire(&self, permits: u32, ctx: &WaitContext) -> Result<Duration> {
        let start = Instant::now();
        let delay = self.bucket.acquire(permits, ctx).await?;
        self.stats.record_request();

        if delay.is_zero() {
            return Ok(Duration::ZERO);
        }

        let waited = start.elapsed();
        self.stats.record_delay(waited);
        log::debug!(
            "Domain {} delayed {} permit(s) by {}ms",
            self.key,
            permits,
            waited.as_millis()
        );
        Ok(waited)
    }

    /// Take one permit if available right now, recording only granted requests
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        let granted = self.bucket.try_acquire(1);
        if granted {
            self.stats.record_request();
        }
        granted
    }

    /// Get domain statistics
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// The configuration this domain is throttled with
    #[must_use]
    pub const fn config(&self) -> LimitConfig {
        self.bucket.config()
    }

    /// The underlying token bucket
    #[must_use]
    pub const fn bucket(&self) -> &TokenBucket {
        &self.bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::limit;

    fn domain(rate: f64, burst: u32) -> Domain {
        Domain::new(DomainKey::try_from("example.com").unwrap(), limit!(rate, burst))
    }

    #[tokio::test(start_paused = true)]
    async fn test_domain_creation() {
        let domain = domain(2.0, 2);
        assert_eq!(domain.key.as_str(), "example.com");
        assert_eq!(domain.config(), limit!(2.0, 2));
        assert_eq!(domain.stats(), StatsSnapshot::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_records_requests_and_delays() {
        let domain = domain(1.0, 1);
        let ctx = WaitContext::default();

        assert_eq!(domain.acquire(1, &ctx).await, Ok(Duration::ZERO));
        assert_eq!(domain.acquire(1, &ctx).await, Ok(Duration::from_secs(1)));

        let stats = domain.stats();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.delayed_requests, 1);
        assert_eq!(stats.total_wait_time, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_acquire_is_not_recorded() {
        let domain = domain(1.0, 1);
        assert!(domain.try_acquire());

        let ctx = WaitContext::default().with_timeout(Duration::from_millis(10));
        assert!(domain.acquire(1, &ctx).await.is_err());
        assert_eq!(domain.stats().total_requests, 1);
        assert_eq!(domain.stats().delayed_requests, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire_records_only_granted() {
        let domain = domain(1.0, 1);
        assert!(domain.try_acquire());
        assert!(!domain.try_acquire());

        let stats = domain.stats();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.delayed_requests, 0);
        assert_eq!(stats.total_wait_time, Duration::ZERO);
    }
}

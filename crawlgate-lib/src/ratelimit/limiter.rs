use std::sync::Arc;

use url::Url;

use crate::Result;
use crate::ratelimit::{
    ConfigError, ConfigFile, DomainConfigs, DomainKey, DomainRegistry, LimitConfig,
    RateLimitError, StatsMap, StatsSnapshot, WaitContext,
};

/// Per-domain rate limiter for crawlers.
///
/// Call [`RateLimiter::wait`] (or [`RateLimiter::allow`]) before every
/// request to a domain. Each domain is throttled by its own token bucket;
/// domains that were not configured explicitly get the default
/// configuration the first time they are seen.
///
/// `RateLimiter` is cheap to clone. All clones share the same domains, so a
/// limiter can be handed to every crawler task.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use std::time::Duration;
/// use crawlgate_lib::{LimitConfig, RateLimiter, WaitContext};
///
/// # #[tokio::main]
/// # async fn main() -> crawlgate_lib::Result<()> {
/// let limiter = RateLimiter::new(HashMap::new(), LimitConfig::new(10.0, 5)?);
///
/// let ctx = WaitContext::default().with_timeout(Duration::from_secs(2));
/// limiter.wait("example.com", &ctx).await?;
///
/// assert!(limiter.allow("example.com"));
/// assert_eq!(limiter.get_stats("example.com")?.total_requests, 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RateLimiter {
    registry: Arc<DomainRegistry>,
}

impl RateLimiter {
    /// Create a limiter with pre-registered `domains` and a `default_config`
    /// for all other domains.
    ///
    /// Invalid domain entries are skipped and an invalid default falls back
    /// to [`LimitConfig::CONSERVATIVE`]; both are logged as warnings.
    #[must_use]
    pub fn new(domains: DomainConfigs, default_config: LimitConfig) -> Self {
        let configured = domains.len();
        let registry = DomainRegistry::with_domains(domains, default_config);
        let default_config = registry.default_config();
        log::info!(
            "Initialized rate limiter: default {} req/s, burst {}, {} of {configured} domain(s) pre-registered",
            default_config.rate_per_second(),
            default_config.burst_capacity(),
            registry.active_domain_count()
        );

        Self {
            registry: Arc::new(registry),
        }
    }

    /// Create a limiter from a loaded configuration file
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::InvalidConfig`] if the file does not pass
    /// [`ConfigFile::validate`].
    pub fn from_config(config: &ConfigFile) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.domains.clone(), config.default_config))
    }

    /// Block until one request to `domain` is allowed
    ///
    /// # Errors
    ///
    /// See [`RateLimiter::wait_n`].
    pub async fn wait(&self, domain: &str, ctx: &WaitContext) -> Result<()> {
        self.wait_n(domain, 1, ctx).await
    }

    /// Block until `permits` requests to `domain` are allowed.
    ///
    /// The wait honors the deadline and cancellation token of `ctx`. A
    /// deadline that cannot be met fails right away instead of sleeping
    /// until it expires. When the wait fails, the permits are given back.
    ///
    /// # Errors
    ///
    /// - [`RateLimitError::LimiterClosed`] after [`RateLimiter::close`],
    ///   checked before anything else
    /// - [`RateLimitError::InvalidConfig`] if `permits` is zero or larger
    ///   than the domain's burst capacity
    /// - [`RateLimitError::InvalidDomain`] for an empty domain name
    /// - [`RateLimitError::DeadlineExceeded`] or [`RateLimitError::Cancelled`]
    ///   if `ctx` ended the wait
    pub async fn wait_n(&self, domain: &str, permits: u32, ctx: &WaitContext) -> Result<()> {
        if self.is_closed() {
            return Err(RateLimitError::LimiterClosed);
        }
        if permits == 0 {
            return Err(ConfigError::InvalidPermitCount(permits).into());
        }
        let domain = self.registry.get_or_create(domain)?;
        domain.acquire(permits, ctx).await?;
        Ok(())
    }

    /// Block until one request to the host of `url` is allowed
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::InvalidDomain`] if `url` has no host,
    /// otherwise see [`RateLimiter::wait_n`].
    pub async fn wait_url(&self, url: &Url, ctx: &WaitContext) -> Result<()> {
        let key = DomainKey::try_from(url)?;
        self.wait(key.as_str(), ctx).await
    }

    /// Take one permit for `domain` if it is available right now.
    ///
    /// Never waits and never puts the bucket into debt. Only granted
    /// requests are recorded in the statistics.
    #[must_use]
    pub fn allow(&self, domain: &str) -> bool {
        match self.registry.get_or_create(domain) {
            Ok(limiter) => {
                let granted = limiter.try_acquire();
                if !granted {
                    log::debug!("Request to {domain} not allowed: rate limit reached");
                }
                granted
            }
            Err(RateLimitError::InvalidDomain) => {
                log::warn!("Request not allowed: domain name must not be empty");
                false
            }
            Err(e) => {
                log::debug!("Request to {domain} not allowed: {e}");
                false
            }
        }
    }

    /// Replace the configuration of `domain`, resetting its statistics
    ///
    /// # Errors
    ///
    /// See [`DomainRegistry::update_config`].
    pub fn update_config(&self, domain: &str, config: LimitConfig) -> Result<()> {
        self.registry.update_config(domain, config)
    }

    /// Get statistics for a domain
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::DomainNotFound`] for a domain that was never
    /// used and [`RateLimitError::LimiterClosed`] after close.
    pub fn get_stats(&self, domain: &str) -> Result<StatsSnapshot> {
        self.registry.get_stats(domain)
    }

    /// Get statistics for all domains
    #[must_use]
    pub fn get_all_stats(&self) -> StatsMap {
        self.registry.get_all_stats()
    }

    /// Get the configuration a domain is currently throttled with
    ///
    /// # Errors
    ///
    /// See [`RateLimiter::get_stats`].
    pub fn domain_config(&self, domain: &str) -> Result<LimitConfig> {
        self.registry.domain_config(domain)
    }

    /// The configuration used for domains without an explicit entry
    #[must_use]
    pub fn default_config(&self) -> LimitConfig {
        self.registry.default_config()
    }

    /// Get the number of domains with an active limiter
    #[must_use]
    pub fn active_domain_count(&self) -> usize {
        self.registry.active_domain_count()
    }

    /// Whether [`RateLimiter::close`] has been called on any clone
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.registry.is_closed()
    }

    /// Release all domain state. Further operations fail with
    /// [`RateLimitError::LimiterClosed`].
    ///
    /// # Errors
    ///
    /// Closing never fails. Calling it again is a no-op.
    pub fn close(&self) -> Result<()> {
        self.registry.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;
    use test_utils::{assert_duration_near, limit};
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    fn limiter(rate: f64, burst: u32) -> RateLimiter {
        RateLimiter::new(HashMap::new(), limit!(rate, burst))
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_within_burst_is_immediate() {
        let limiter = limiter(1.0, 3);
        let start = Instant::now();
        for _ in 0..3 {
            limiter
                .wait("example.com", &WaitContext::default())
                .await
                .unwrap();
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        let stats = limiter.get_stats("example.com").unwrap();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.delayed_requests, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_n_rejects_zero_without_creating_domain() {
        let limiter = limiter(1.0, 3);
        assert_eq!(
            limiter
                .wait_n("example.com", 0, &WaitContext::default())
                .await,
            Err(RateLimitError::InvalidConfig(
                ConfigError::InvalidPermitCount(0)
            ))
        );
        assert_eq!(limiter.active_domain_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_n_rejects_more_than_burst() {
        let limiter = limiter(1.0, 3);
        let result = limiter
            .wait_n("example.com", 4, &WaitContext::default())
            .await;
        assert_eq!(
            result,
            Err(RateLimitError::InvalidConfig(ConfigError::ExceedsBurst {
                requested: 4,
                burst: 3
            }))
        );
        assert_eq!(limiter.get_stats("example.com").unwrap().total_requests, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_n_takes_multiple_permits() {
        let limiter = limiter(2.0, 4);
        let ctx = WaitContext::default();
        limiter.wait_n("example.com", 4, &ctx).await.unwrap();

        let start = Instant::now();
        limiter.wait_n("example.com", 2, &ctx).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_empty_domain() {
        let limiter = limiter(1.0, 1);
        assert_eq!(
            limiter.wait("", &WaitContext::default()).await,
            Err(RateLimitError::InvalidDomain)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_url_uses_host() {
        let limiter = limiter(1.0, 1);
        let url = Url::parse("https://api.github.com/repos/rust-lang/rust").unwrap();
        limiter
            .wait_url(&url, &WaitContext::default())
            .await
            .unwrap();
        assert_eq!(limiter.get_stats("api.github.com").unwrap().total_requests, 1);

        let no_host = Url::parse("mailto:someone@example.com").unwrap();
        assert_eq!(
            limiter.wait_url(&no_host, &WaitContext::default()).await,
            Err(RateLimitError::InvalidDomain)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_deadline_fails_without_sleeping() {
        let limiter = limiter(0.1, 1);
        assert!(limiter.allow("slow.example"));

        let start = Instant::now();
        let ctx = WaitContext::default().with_timeout(Duration::from_millis(100));
        let err = limiter.wait("slow.example", &ctx).await.unwrap_err();
        assert!(err.is_deadline_exceeded());
        assert_eq!(start.elapsed(), Duration::ZERO);

        // The failed wait must not have put the bucket into debt
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(limiter.allow("slow.example"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_wait() {
        let limiter = limiter(1.0, 1);
        assert!(limiter.allow("example.com"));

        let token = CancellationToken::new();
        let ctx = WaitContext::default().with_cancellation(token.clone());
        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.wait("example.com", &ctx).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
        assert_eq!(waiter.await.unwrap(), Err(RateLimitError::Cancelled));

        let stats = limiter.get_stats("example.com").unwrap();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.delayed_requests, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_wait_returns_permit() {
        let limiter = limiter(1.0, 1);
        assert!(limiter.allow("example.com"));

        let result = tokio::time::timeout(
            Duration::from_millis(50),
            limiter.wait("example.com", &WaitContext::default()),
        )
        .await;
        assert!(result.is_err());

        // Only the refill of one second is needed, not two
        tokio::time::advance(Duration::from_millis(1000)).await;
        assert!(limiter.allow("example.com"));

        let stats = limiter.get_stats("example.com").unwrap();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.delayed_requests, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tiny_rate_wait_fails_fast() {
        let limiter = limiter(1e-20, 1);
        assert!(limiter.allow("example.com"));

        let start = Instant::now();
        let ctx = WaitContext::default().with_timeout(Duration::from_millis(100));
        let err = limiter.wait("example.com", &ctx).await.unwrap_err();
        assert!(err.is_deadline_exceeded());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_finishes_on_replaced_domain() {
        let limiter = limiter(1.0, 1);
        assert!(limiter.allow("example.com"));

        let start = Instant::now();
        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                limiter
                    .wait("example.com", &WaitContext::default())
                    .await
                    .map(|()| start.elapsed())
            })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        limiter
            .update_config("example.com", limit!(100.0, 5))
            .unwrap();

        // The waiter keeps the delay of the bucket it reserved from
        let waited = waiter.await.unwrap().unwrap();
        assert_duration_near!(waited, Duration::from_secs(1), Duration::from_millis(5));

        // and is not counted against the new domain, whose bucket is still full
        let stats = limiter.get_stats("example.com").unwrap();
        assert_eq!(stats.total_requests, 0);
        for _ in 0..5 {
            assert!(limiter.allow("example.com"));
        }
        assert!(!limiter.allow("example.com"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_limiter_checked_before_permit_count() {
        let limiter = limiter(1.0, 1);
        limiter.close().unwrap();
        assert_eq!(
            limiter
                .wait_n("example.com", 0, &WaitContext::default())
                .await,
            Err(RateLimitError::LimiterClosed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_allow() {
        let limiter = limiter(1.0, 2);
        assert!(limiter.allow("example.com"));
        assert!(limiter.allow("example.com"));
        assert!(!limiter.allow("example.com"));
        assert!(!limiter.allow(""));

        let stats = limiter.get_stats("example.com").unwrap();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.delayed_requests, 0);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.allow("example.com"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pre_registered_domains() {
        let domains: HashMap<_, _> = [("fast.example".to_string(), limit!(100.0, 10))]
            .into_iter()
            .collect();
        let limiter = RateLimiter::new(domains, LimitConfig::CONSERVATIVE);

        assert_eq!(limiter.active_domain_count(), 1);
        assert_eq!(limiter.domain_config("fast.example"), Ok(limit!(100.0, 10)));
        assert_eq!(
            limiter.domain_config("other.example"),
            Err(RateLimitError::DomainNotFound("other.example".to_string()))
        );
        assert_eq!(limiter.default_config(), LimitConfig::CONSERVATIVE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_config_resets_stats() {
        let limiter = limiter(1.0, 1);
        limiter
            .wait("example.com", &WaitContext::default())
            .await
            .unwrap();

        limiter
            .update_config("example.com", limit!(10.0, 10))
            .unwrap();
        assert_eq!(limiter.get_stats("example.com").unwrap().total_requests, 0);
        assert_eq!(limiter.domain_config("example.com"), Ok(limit!(10.0, 10)));

        // The new bucket starts full
        for _ in 0..10 {
            assert!(limiter.allow("example.com"));
        }
        assert!(!limiter.allow("example.com"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_from_config() {
        let config = ConfigFile::from_toml_str(
            r#"
            version = "1"

            [default_config]
            requests_per_second = 2.0
            burst_capacity = 2

            [domains."docs.example"]
            requests_per_second = 5.0
            burst_capacity = 5
            "#,
        )
        .unwrap();

        let limiter = RateLimiter::from_config(&config).unwrap();
        assert_eq!(limiter.default_config(), limit!(2.0, 2));
        assert_eq!(limiter.domain_config("docs.example"), Ok(limit!(5.0, 5)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_limiter() {
        let limiter = limiter(1.0, 1);
        let clone = limiter.clone();
        assert!(limiter.allow("example.com"));

        assert_eq!(clone.close(), Ok(()));
        assert_eq!(limiter.close(), Ok(()));
        assert!(limiter.is_closed());

        assert_eq!(
            limiter.wait("example.com", &WaitContext::default()).await,
            Err(RateLimitError::LimiterClosed)
        );
        assert!(!limiter.allow("example.com"));
        assert_eq!(
            limiter.get_stats("example.com"),
            Err(RateLimitError::LimiterClosed)
        );
        assert!(limiter.get_all_stats().is_empty());
        assert_eq!(limiter.active_domain_count(), 0);
    }
}

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::Result;
use crate::ratelimit::{
    Domain, DomainConfigs, DomainKey, LimitConfig, RateLimitError, StatsMap, StatsSnapshot,
};

/// Maps domain names to their [`Domain`] instances.
///
/// The `DomainRegistry` owns all per-domain state. Domains are created
/// lazily under the default configuration the first time they are
/// requested, can be reconfigured at runtime, and are all dropped when the
/// registry is closed.
///
/// # Concurrency
///
/// - Lookups only take a shared lock on one `DashMap` shard
/// - Creation goes through the entry API, which holds the shard exclusively
///   and re-checks for a concurrent insertion, so at most one [`Domain`] is
///   ever created per name
/// - Every [`Domain`] guards its own bucket and statistics, so traffic to
///   one domain never serializes another
#[derive(Debug)]
pub struct DomainRegistry {
    /// Map of domain name to Domain instances, created on-demand
    domains: DashMap<DomainKey, Arc<Domain>>,

    /// Configuration for domains without an explicit entry
    default_config: LimitConfig,

    /// Set exactly once by [`DomainRegistry::close`]
    closed: AtomicBool,
}

impl DomainRegistry {
    /// Create a registry whose unseen domains use `default_config`.
    ///
    /// An invalid default falls back to [`LimitConfig::CONSERVATIVE`].
    #[must_use]
    pub fn new(default_config: LimitConfig) -> Self {
        let default_config = match default_config.validate() {
            Ok(()) => default_config,
            Err(e) => {
                log::warn!("Invalid default rate limit ({e}), falling back to 1 req/s, burst 1");
                LimitConfig::CONSERVATIVE
            }
        };

        Self {
            domains: DashMap::new(),
            default_config,
            closed: AtomicBool::new(false),
        }
    }

    /// Create a registry with explicitly configured domains registered up front.
    ///
    /// Entries with an empty name or an invalid configuration are logged and
    /// skipped.
    #[must_use]
    pub fn with_domains(domains: DomainConfigs, default_config: LimitConfig) -> Self {
        let registry = Self::new(default_config);
        for (domain, config) in domains {
            match registry.update_config(&domain, config) {
                Ok(()) => log::debug!(
                    "Pre-registered domain {domain}: {} req/s, burst {}",
                    config.rate_per_second(),
                    config.burst_capacity()
                ),
                Err(e) => log::warn!("Skipping rate limit for domain {domain:?}: {e}"),
            }
        }
        registry
    }

    /// Get an existing domain or create a new one under the default configuration
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::LimiterClosed`] after [`DomainRegistry::close`]
    /// and [`RateLimitError::InvalidDomain`] for an empty domain name.
    pub fn get_or_create(&self, domain: &str) -> Result<Arc<Domain>> {
        self.ensure_open()?;
        let key = DomainKey::try_from(domain)?;

        if let Some(existing) = self.domains.get(&key) {
            return Ok(Arc::clone(existing.value()));
        }

        match self.domains.entry(key) {
            // Another caller created it between the lookup and the entry call
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                // `close` may have run since the first check; it clears the
                // map afterwards, but must not race with a fresh insertion.
                self.ensure_open()?;
                let created = Arc::new(Domain::new(entry.key().clone(), self.default_config));
                log::info!(
                    "Created rate limiter for domain {}: {} req/s, burst {}",
                    created.key,
                    self.default_config.rate_per_second(),
                    self.default_config.burst_capacity()
                );
                Ok(Arc::clone(entry.insert(created).value()))
            }
        }
    }

    /// Replace a domain's limiter with a fresh one using `config`.
    ///
    /// The previous bucket, including any token debt, is discarded and the
    /// statistics start from zero. Requests already waiting on the previous
    /// limiter complete against it. Unseen domains are created.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::LimiterClosed`] after close,
    /// [`RateLimitError::InvalidConfig`] for an invalid `config` and
    /// [`RateLimitError::InvalidDomain`] for an empty domain name.
    pub fn update_config(&self, domain: &str, config: LimitConfig) -> Result<()> {
        self.ensure_open()?;
        config.validate()?;
        let key = DomainKey::try_from(domain)?;

        let replacement = Arc::new(Domain::new(key.clone(), config));
        match self.domains.entry(key) {
            Entry::Occupied(mut entry) => {
                entry.insert(replacement);
            }
            Entry::Vacant(entry) => {
                self.ensure_open()?;
                entry.insert(replacement);
            }
        }

        log::info!(
            "Updated rate limit for domain {domain}: {} req/s, burst {}",
            config.rate_per_second(),
            config.burst_capacity()
        );
        Ok(())
    }

    /// Get statistics for a domain that has been used before
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::LimiterClosed`] after close and
    /// [`RateLimitError::DomainNotFound`] if the domain was never created.
    pub fn get_stats(&self, domain: &str) -> Result<StatsSnapshot> {
        self.get(domain).map(|domain| domain.stats())
    }

    /// Get the configuration of a domain that has been used before
    ///
    /// # Errors
    ///
    /// See [`DomainRegistry::get_stats`].
    pub fn domain_config(&self, domain: &str) -> Result<LimitConfig> {
        self.get(domain).map(|domain| domain.config())
    }

    /// Get statistics for all domains that have been created
    ///
    /// Empty once the registry is closed.
    #[must_use]
    pub fn get_all_stats(&self) -> StatsMap {
        if self.is_closed() {
            return StatsMap::default();
        }
        self.domains
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().stats()))
            .collect()
    }

    /// Stop accepting operations and drop all domain state.
    ///
    /// Calling `close` more than once is a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            log::debug!("Rate limiter already closed");
            return;
        }

        let released = self.domains.len();
        self.domains.clear();
        log::info!("Closed rate limiter, released {released} domain(s)");
    }

    /// Whether [`DomainRegistry::close`] has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// The configuration used for unseen domains
    #[must_use]
    pub const fn default_config(&self) -> LimitConfig {
        self.default_config
    }

    /// Get the number of domains that currently have a limiter
    #[must_use]
    pub fn active_domain_count(&self) -> usize {
        self.domains.len()
    }

    fn get(&self, domain: &str) -> Result<Arc<Domain>> {
        self.ensure_open()?;
        DomainKey::try_from(domain)
            .ok()
            .and_then(|key| self.domains.get(&key).map(|entry| Arc::clone(entry.value())))
            .ok_or_else(|| RateLimitError::DomainNotFound(domain.to_string()))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(RateLimitError::LimiterClosed);
        }
        Ok(())
    }
}

//! Per-domain rate limiting.
//!
//! This module throttles outbound requests on a per-domain basis using a
//! continuously refilled token bucket for every domain.
//!
//! # Architecture
//!
//! - [`LimitConfig`]: Rate and burst capacity for one domain
//! - [`TokenBucket`]: The refill math, reservations and cancellable waiting
//! - [`StatsAccumulator`]: Concurrent request/delay counters for one domain
//! - [`Domain`]: A domain's bucket and statistics, created together
//! - [`DomainRegistry`]: Maps domain names to [`Domain`]s, created on demand
//! - [`RateLimiter`]: The public entry point used by crawlers

mod config;
mod context;
mod domain;
mod error;
mod limiter;
mod registry;

pub use config::{ConfigFile, DomainConfigs, LimitConfig};
pub use context::WaitContext;
pub use domain::{
    Domain, DomainKey, Reservation, StatsAccumulator, StatsMap, StatsSnapshot, TokenBucket,
};
pub use error::{ConfigError, RateLimitError};
pub use limiter::RateLimiter;
pub use registry::DomainRegistry;

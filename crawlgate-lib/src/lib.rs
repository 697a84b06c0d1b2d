//! `crawlgate` keeps a crawler polite: every target domain gets its own
//! token bucket, so no single site is hit faster than its configured rate
//! while different domains proceed independently.
//!
//! ```
//! use std::collections::HashMap;
//! use crawlgate_lib::{LimitConfig, RateLimiter, Result, WaitContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut domains = HashMap::new();
//!     domains.insert("example.com".to_string(), LimitConfig::new(2.0, 2)?);
//!
//!     let limiter = RateLimiter::new(domains, LimitConfig::CONSERVATIVE);
//!     limiter.wait("example.com", &WaitContext::default()).await?;
//!     // Safe to send the request now
//!
//!     let stats = limiter.get_stats("example.com")?;
//!     assert_eq!(stats.total_requests, 1);
//!     limiter.close()
//! }
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    unused_extern_crates
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]
#![deny(missing_docs)]

pub mod ratelimit;

pub use ratelimit::{
    ConfigError, ConfigFile, Domain, DomainConfigs, DomainKey, DomainRegistry, LimitConfig,
    RateLimitError, RateLimiter, Reservation, StatsAccumulator, StatsMap, StatsSnapshot,
    TokenBucket, WaitContext,
};

/// The crawlgate `Result` type
pub type Result<T> = std::result::Result<T, RateLimitError>;

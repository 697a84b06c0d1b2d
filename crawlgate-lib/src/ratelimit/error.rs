use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Problems with a rate limit configuration or a permit request.
///
/// Every variant is detected synchronously, before any limiter state is
/// touched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The rate must be a finite number greater than zero
    #[error("requests per second must be greater than 0, got {0}")]
    NonPositiveRate(f64),

    /// The burst capacity must allow at least one request
    #[error("burst capacity must be at least 1, got 0")]
    ZeroBurst,

    /// At least one permit has to be requested
    #[error("permit count must be at least 1, got {0}")]
    InvalidPermitCount(u32),

    /// More permits were requested at once than the bucket can ever hold
    #[error("requested {requested} permits, but burst capacity is {burst}")]
    ExceedsBurst {
        /// Number of permits requested
        requested: u32,
        /// Burst capacity of the domain
        burst: u32,
    },

    /// The configuration file does not declare a version
    #[error("configuration file is missing the `version` field")]
    MissingVersion,

    /// A per-domain entry of the configuration file is invalid
    #[error("invalid configuration for domain {domain}: {source}")]
    InvalidDomainConfig {
        /// The domain with the broken entry
        domain: String,
        /// What is wrong with it
        #[source]
        source: Box<ConfigError>,
    },

    /// The default entry of the configuration file is invalid
    #[error("invalid default configuration: {0}")]
    InvalidDefaultConfig(#[source] Box<ConfigError>),

    /// The configuration file could not be read
    #[error("cannot read configuration file {path}: {reason}")]
    ReadFile {
        /// Path of the file
        path: PathBuf,
        /// Underlying I/O error message
        reason: String,
    },

    /// The configuration file could not be deserialized
    #[error("cannot parse configuration: {0}")]
    Parse(String),
}

/// Errors that can occur during rate limiting operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RateLimitError {
    /// The limit configuration or permit request is invalid
    #[error("Invalid rate limit configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// Domain names must not be empty
    #[error("Invalid domain: domain name must not be empty")]
    InvalidDomain,

    /// Statistics or configuration were requested for a domain that was never used
    #[error("Domain {0} not found")]
    DomainNotFound(String),

    /// The limiter was closed and no longer accepts operations
    #[error("Rate limiter is closed")]
    LimiterClosed,

    /// The wait could not finish before the caller's deadline
    #[error("Deadline exceeded: permit would take {}ms", required.as_millis())]
    DeadlineExceeded {
        /// How long the caller would have had to wait from the moment of the request
        required: Duration,
    },

    /// The wait was aborted through its cancellation token
    #[error("Wait was cancelled")]
    Cancelled,
}

impl RateLimitError {
    /// Returns `true` if the limiter was already closed
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::LimiterClosed)
    }

    /// Returns `true` for configuration and permit count problems
    #[must_use]
    pub const fn is_invalid_config(&self) -> bool {
        matches!(self, Self::InvalidConfig(_))
    }

    /// Returns `true` if a caller-specified time budget ran out
    #[must_use]
    pub const fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }

    /// Returns `true` if the wait was cancelled from outside
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::ratelimit::ConfigError;

/// Rate limiting configuration for a single domain
///
/// [`LimitConfig::new`] validates its input. Deserialization does not, so
/// [`ConfigFile`] and the limiter validate every entry before using it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitConfig {
    /// Permits refilled per second. Fractional values are allowed,
    /// e.g. `0.5` means one request every two seconds.
    #[serde(rename = "requests_per_second")]
    rate_per_second: f64,

    /// Number of permits that can accumulate while a domain is idle
    burst_capacity: u32,
}

impl LimitConfig {
    /// Conservative fallback: one request per second, no bursting.
    pub const CONSERVATIVE: LimitConfig = LimitConfig {
        rate_per_second: 1.0,
        burst_capacity: 1,
    };

    /// Create a validated configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NonPositiveRate`] if `rate_per_second` is not a
    /// finite number greater than zero and [`ConfigError::ZeroBurst`] if
    /// `burst_capacity` is zero.
    pub fn new(rate_per_second: f64, burst_capacity: u32) -> Result<Self, ConfigError> {
        let config = Self {
            rate_per_second,
            burst_capacity,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check both limits independently, reporting the first one that fails
    ///
    /// # Errors
    ///
    /// See [`LimitConfig::new`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.rate_per_second.is_finite() && self.rate_per_second > 0.0) {
            return Err(ConfigError::NonPositiveRate(self.rate_per_second));
        }
        if self.burst_capacity < 1 {
            return Err(ConfigError::ZeroBurst);
        }
        Ok(())
    }

    /// Permits refilled per second
    #[must_use]
    pub const fn rate_per_second(&self) -> f64 {
        self.rate_per_second
    }

    /// Maximum number of permits that can accumulate
    #[must_use]
    pub const fn burst_capacity(&self) -> u32 {
        self.burst_capacity
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self::CONSERVATIVE
    }
}

/// Per-domain configuration overrides
pub type DomainConfigs = HashMap<String, LimitConfig>;

/// A rate limiting configuration file
///
/// ```toml
/// version = "1"
///
/// [default_config]
/// requests_per_second = 1.0
/// burst_capacity = 1
///
/// [domains."example.com"]
/// requests_per_second = 2.0
/// burst_capacity = 2
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Format version of the file; must not be empty
    pub version: String,

    /// Configuration for domains without an explicit entry
    pub default_config: LimitConfig,

    /// Explicit per-domain configuration
    #[serde(default)]
    pub domains: DomainConfigs,
}

impl ConfigFile {
    /// Load a configuration file from disk
    ///
    /// Files ending in `.json` are parsed as JSON, everything else as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, cannot be parsed, or does
    /// not pass [`ConfigFile::validate`].
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&contents)
        } else {
            Self::from_toml_str(&contents)
        }
    }

    /// Parse and validate a TOML configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid TOML for a [`ConfigFile`]
    /// or does not pass [`ConfigFile::validate`].
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid JSON for a [`ConfigFile`]
    /// or does not pass [`ConfigFile::validate`].
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the version field, the default config and every domain config
    ///
    /// # Errors
    ///
    /// Returns the first problem found. Domains are checked in name order so
    /// the reported domain is stable across runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version.trim().is_empty() {
            return Err(ConfigError::MissingVersion);
        }

        self.default_config
            .validate()
            .map_err(|e| ConfigError::InvalidDefaultConfig(Box::new(e)))?;

        let mut domains: Vec<_> = self.domains.iter().collect();
        domains.sort_by_key(|(domain, _)| domain.as_str());
        for (domain, config) in domains {
            config
                .validate()
                .map_err(|e| ConfigError::InvalidDomainConfig {
                    domain: domain.clone(),
                    source: Box::new(e),
                })?;
        }

        Ok(())
    }
}

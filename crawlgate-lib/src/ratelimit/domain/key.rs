use std::fmt;
use url::Url;

use crate::ratelimit::RateLimitError;

/// A validated domain name used to look up a domain's limiter.
///
/// Domain keys are case-sensitive: `Example.com` and `example.com` are
/// throttled independently. The only requirement is that the name is not
/// empty.
///
/// # Examples
///
/// ```
/// use crawlgate_lib::DomainKey;
/// use url::Url;
///
/// let url = Url::parse("https://api.github.com/repos/user/repo").unwrap();
/// let key = DomainKey::try_from(&url).unwrap();
/// assert_eq!(key.as_str(), "api.github.com");
///
/// assert!(DomainKey::try_from("").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomainKey(String);

impl DomainKey {
    /// Get the domain name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the domain name as an owned String
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for DomainKey {
    type Error = RateLimitError;

    fn try_from(domain: String) -> Result<Self, Self::Error> {
        if domain.is_empty() {
            return Err(RateLimitError::InvalidDomain);
        }
        Ok(DomainKey(domain))
    }
}

impl TryFrom<&str> for DomainKey {
    type Error = RateLimitError;

    fn try_from(domain: &str) -> Result<Self, Self::Error> {
        Self::try_from(domain.to_string())
    }
}

impl TryFrom<&Url> for DomainKey {
    type Error = RateLimitError;

    /// Use the host of `url` as the domain. URLs without a host
    /// (e.g. `file://` or `mailto:`) are rejected.
    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        let host = url.host_str().ok_or(RateLimitError::InvalidDomain)?;
        Self::try_from(host)
    }
}

impl AsRef<str> for DomainKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

use crate::url::CanonicalUrl;
use crate::ConfigError;
use regex::Regex;

/// Checks if a host matches a wildcard pattern
///
/// This function supports two types of patterns:
/// 1. Exact match: "example.com" matches only "example.com"
/// 2. Wildcard match: "*.example.com" matches:
///    - "example.com" (the bare domain)
///    - "www.example.com" (single subdomain)
///    - "api.v2.example.com" (nested subdomains)
///
/// # Examples
///
/// ```
/// use quill_harvest::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "example.com"));
/// assert!(!matches_wildcard("example.com", "other.com"));
///
/// assert!(matches_wildcard("*.example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "www.example.com"));
/// assert!(!matches_wildcard("*.example.com", "example.org"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base || candidate.ends_with(&format!(".{}", base))
    } else {
        candidate == pattern
    }
}

/// Site-specific predicate deciding which discovered links are candidates
///
/// A link qualifies when its host matches the domain pattern and its
/// canonical form matches the URL regex.
#[derive(Debug, Clone)]
pub struct LinkPattern {
    domain: String,
    regex: Regex,
}

impl LinkPattern {
    /// Builds a pattern from a host wildcard and a URL regex
    pub fn new(domain: &str, url_pattern: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(url_pattern).map_err(|e| {
            ConfigError::InvalidPattern(format!("Invalid url-pattern '{}': {}", url_pattern, e))
        })?;

        Ok(Self {
            domain: domain.to_lowercase(),
            regex,
        })
    }

    /// Returns true if the URL is a crawl candidate for this site
    pub fn matches(&self, url: &CanonicalUrl) -> bool {
        let Some(host) = url.host() else {
            return false;
        };

        matches_wildcard(&self.domain, &host) && self.regex.is_match(url.as_str())
    }

    /// The domain pattern this predicate was built with
    pub fn domain(&self) -> &str {
        &self.domain
    }
}

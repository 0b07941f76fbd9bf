use crate::UrlError;
use std::fmt;
use url::Url;

/// A URL in canonical form, used as the dedup key everywhere
///
/// Two URLs that differ only in host case, dot segments, fragment, an empty
/// query or a trailing slash share one `CanonicalUrl`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalUrl(String);

impl CanonicalUrl {
    /// Parses and canonicalizes a URL string
    pub fn parse(raw: &str) -> Result<Self, UrlError> {
        canonicalize(raw)
    }

    /// Returns the canonical string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the parsed form of this URL
    ///
    /// Canonical strings always re-parse, so this cannot fail for values
    /// built through [`canonicalize`].
    pub fn to_url(&self) -> Option<Url> {
        Url::parse(&self.0).ok()
    }

    /// Returns the lowercase host of this URL
    pub fn host(&self) -> Option<String> {
        self.to_url()
            .and_then(|url| url.host_str().map(|h| h.to_lowercase()))
    }

    /// Derives an article identifier from the last non-empty path segment
    ///
    /// `https://site.com/node/179878` yields `179878`; a URL without a path
    /// yields its host.
    pub fn article_id(&self) -> String {
        let Some(url) = self.to_url() else {
            return self.0.clone();
        };

        url.path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(|s| s.to_string())
            .or_else(|| url.host_str().map(|h| h.to_string()))
            .unwrap_or_else(|| self.0.clone())
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Canonicalizes a URL according to Quill-Harvest's dedup rules
///
/// # Canonicalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Accept only http and https schemes
/// 3. Lowercase the host (the parser also resolves `.` and `..` segments)
/// 4. Remove the fragment
/// 5. Remove an empty query string (trailing `?`)
/// 6. Remove the trailing slash, including the root slash
///
/// # Examples
///
/// ```
/// use quill_harvest::url::canonicalize;
///
/// let url = canonicalize("https://WWW.Example.com/node/12/#comments").unwrap();
/// assert_eq!(url.as_str(), "https://www.example.com/node/12");
/// ```
pub fn canonicalize(raw: &str) -> Result<CanonicalUrl, UrlError> {
    let mut url = Url::parse(raw.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url.host_str().ok_or(UrlError::MissingHost)?.to_lowercase();
    if host.is_empty() {
        return Err(UrlError::MissingHost);
    }
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Parse(format!("Failed to set host: {}", e)))?;

    url.set_fragment(None);

    if url.query() == Some("") {
        url.set_query(None);
    }

    // Url always renders at least "/" as the path, so the trailing slash is
    // trimmed on the serialized form
    let mut serialized = url.to_string();
    if url.query().is_none() {
        while serialized.ends_with('/') {
            serialized.pop();
        }
    } else {
        let path = url.path();
        if path.len() > 1 && path.ends_with('/') {
            let trimmed = path.trim_end_matches('/').to_string();
            url.set_path(&trimmed);
            serialized = url.to_string();
        }
    }

    Ok(CanonicalUrl(serialized))
}

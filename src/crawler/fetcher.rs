//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests bounded by a per-request timeout
//! - Error classification into [`TransportError`]
//!
//! Retries live one level up in the worker; a fetcher makes exactly one
//! attempt per call.

use crate::config::UserAgentConfig;
use crate::url::CanonicalUrl;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;

/// Maximum redirect hops followed per request
const MAX_REDIRECTS: usize = 10;

/// A fetched response body and the metadata validation needs
#[derive(Debug, Clone)]
pub struct RawPage {
    /// URL that was requested
    pub url: CanonicalUrl,

    /// Final URL after redirects
    pub final_url: String,

    /// Decoded page body
    pub body: String,
}

/// Why a single fetch attempt failed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to read body: {0}")]
    Body(String),
}

impl TransportError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            Self::Body(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

/// One HTTP attempt against a URL
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `url`, failing with [`TransportError::Timeout`] after `timeout`
    async fn fetch(&self, url: &CanonicalUrl, timeout: Duration) -> Result<RawPage, TransportError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use quill_harvest::config::UserAgentConfig;
/// use quill_harvest::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "QuillHarvest".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`Fetcher`] backed by a shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config)?))
    }

    async fn fetch_inner(&self, url: &CanonicalUrl) -> Result<RawPage, TransportError> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let final_url = response.url().to_string();
        let body = response.text().await.map_err(TransportError::from_reqwest)?;

        Ok(RawPage {
            url: url.clone(),
            final_url,
            body,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &CanonicalUrl, timeout: Duration) -> Result<RawPage, TransportError> {
        // Covers connect, headers and body together
        match tokio::time::timeout(timeout, self.fetch_inner(url)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

//! Fetch-and-validate worker
//!
//! Processes one URL end to end: recover an artifact left by a crash, pace,
//! fetch with retries, validate, extract, persist, and record the outcome
//! in the tracker. Every URL handed to [`Worker::process`] leaves it either
//! Completed or Failed.

use crate::crawler::adapter::{AdapterError, SiteAdapter};
use crate::crawler::fetcher::{Fetcher, RawPage, TransportError};
use crate::crawler::retry::RetryPolicy;
use crate::storage::{ArtifactSink, StorageError, UrlTracker};
use crate::url::CanonicalUrl;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Why a URL ended up Failed
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: TransportError },

    #[error("invalid content after {attempts} attempts: {reason}")]
    InvalidContent { attempts: u32, reason: String },

    #[error("extraction failed: {0}")]
    Extraction(#[from] AdapterError),

    #[error("failed to persist artifact: {0}")]
    Persistence(#[from] StorageError),
}

/// Outcome of a URL that reached Completed
#[derive(Debug, Clone)]
pub struct ProcessedPage {
    pub url: CanonicalUrl,

    /// Where the artifact lives
    pub path: Option<PathBuf>,

    /// Candidate links discovered on the page
    pub links: Vec<CanonicalUrl>,

    /// True if an existing artifact was adopted without fetching
    pub recovered: bool,

    /// Fetch attempts made (0 when recovered)
    pub attempts: u32,
}

enum AttemptFailure {
    Transport(TransportError),
    Invalid(String),
}

/// Shared, cheaply cloned processing pipeline
#[derive(Clone)]
pub struct Worker {
    fetcher: Arc<dyn Fetcher>,
    adapter: Arc<dyn SiteAdapter>,
    sink: Arc<dyn ArtifactSink>,
    tracker: Arc<UrlTracker>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl Worker {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        adapter: Arc<dyn SiteAdapter>,
        sink: Arc<dyn ArtifactSink>,
        tracker: Arc<UrlTracker>,
        policy: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            adapter,
            sink,
            tracker,
            policy,
            timeout,
        }
    }

    pub fn tracker(&self) -> &Arc<UrlTracker> {
        &self.tracker
    }

    /// Processes one URL to a terminal state
    pub async fn process(&self, url: CanonicalUrl) -> Result<ProcessedPage, FetchError> {
        if let Some(path) = self.sink.find(&url) {
            tracing::info!("Recovered existing artifact for {}", url);
            self.complete(&url);
            return Ok(ProcessedPage {
                url,
                path: Some(path),
                links: Vec::new(),
                recovered: true,
                attempts: 0,
            });
        }

        let pacing = self.policy.pacing_delay();
        if !pacing.is_zero() {
            tokio::time::sleep(pacing).await;
        }

        let (page, attempts) = match self.fetch_valid(&url).await {
            Ok(found) => found,
            Err(error) => {
                self.fail(&url, &error);
                return Err(error);
            }
        };

        let extraction = match self.adapter.extract(&page) {
            Ok(extraction) => extraction,
            Err(e) => {
                let error = FetchError::from(e);
                self.fail(&url, &error);
                return Err(error);
            }
        };

        let path = match self.sink.persist(&url, &extraction.artifact) {
            Ok(path) => path,
            Err(e) => {
                let error = FetchError::from(e);
                self.fail(&url, &error);
                return Err(error);
            }
        };

        self.complete(&url);
        tracing::debug!(
            "Completed {} after {} attempt(s), {} candidate links",
            url,
            attempts,
            extraction.links.len()
        );

        Ok(ProcessedPage {
            url,
            path: Some(path),
            links: extraction.links,
            recovered: false,
            attempts,
        })
    }

    /// Fetches until the adapter accepts the page or the budget runs out
    async fn fetch_valid(&self, url: &CanonicalUrl) -> Result<(RawPage, u32), FetchError> {
        let mut last = AttemptFailure::Invalid("no attempt made".to_string());

        for attempt in 0..self.policy.max_attempts() {
            last = match self.fetcher.fetch(url, self.timeout).await {
                Ok(page) => match self.adapter.rejection(&page) {
                    None => return Ok((page, attempt + 1)),
                    Some(reason) => AttemptFailure::Invalid(reason),
                },
                Err(e) => AttemptFailure::Transport(e),
            };

            if self.policy.should_retry(attempt) {
                let delay = self.policy.backoff(attempt);
                match &last {
                    AttemptFailure::Transport(e) => tracing::debug!(
                        "Attempt {} for {} failed ({}), retrying in {:?}",
                        attempt + 1,
                        url,
                        e,
                        delay
                    ),
                    AttemptFailure::Invalid(reason) => tracing::debug!(
                        "Attempt {} for {} returned invalid content ({}), retrying in {:?}",
                        attempt + 1,
                        url,
                        reason,
                        delay
                    ),
                }
                tokio::time::sleep(delay).await;
            }
        }

        let attempts = self.policy.max_attempts();
        Err(match last {
            AttemptFailure::Transport(last) => FetchError::Exhausted { attempts, last },
            AttemptFailure::Invalid(reason) => FetchError::InvalidContent { attempts, reason },
        })
    }

    fn complete(&self, url: &CanonicalUrl) {
        // The tracker already warned; a lost append costs one re-fetch
        let _ = self.tracker.mark_completed(url);
    }

    fn fail(&self, url: &CanonicalUrl, error: &FetchError) {
        tracing::warn!("Failed {}: {}", url, error);
        let _ = self.tracker.mark_failed(url, &error.to_string(), Utc::now());
    }
}

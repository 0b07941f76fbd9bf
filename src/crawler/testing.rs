//! Scripted fetcher and fixtures for crawler unit tests

use crate::config::SiteConfig;
use crate::crawler::fetcher::{Fetcher, RawPage, TransportError};
use crate::url::CanonicalUrl;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

type Response = Result<String, TransportError>;

/// Fetcher answering from per-URL scripts
///
/// Each URL has a queue of responses; the last one repeats. URLs without a
/// script answer HTTP 404.
#[derive(Default)]
pub struct StubFetcher {
    scripts: Mutex<HashMap<CanonicalUrl, VecDeque<Response>>>,
    calls: Mutex<Vec<(CanonicalUrl, Instant)>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    latency: Duration,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn page(&self, url: &CanonicalUrl, html: &str) {
        self.script(url, vec![Ok(html.to_string())]);
    }

    pub fn script(&self, url: &CanonicalUrl, responses: Vec<Response>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.clone(), responses.into());
    }

    pub fn calls_for(&self, url: &CanonicalUrl) -> usize {
        self.call_times(url).len()
    }

    pub fn call_times(&self, url: &CanonicalUrl) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, t)| *t)
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Called URLs in call order
    pub fn called(&self) -> Vec<CanonicalUrl> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(u, _)| u.clone())
            .collect()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn next_response(&self, url: &CanonicalUrl) -> Response {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or(Err(TransportError::Status(404))),
            None => Err(TransportError::Status(404)),
        }
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &CanonicalUrl, _timeout: Duration) -> Result<RawPage, TransportError> {
        self.calls.lock().unwrap().push((url.clone(), Instant::now()));
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let response = self.next_response(url);
        self.active.fetch_sub(1, Ordering::SeqCst);

        response.map(|body| RawPage {
            url: url.clone(),
            final_url: url.as_str().to_string(),
            body,
        })
    }
}

/// Site accepting `https://www.example.com/node/<n>` articles
pub fn test_site() -> SiteConfig {
    SiteConfig {
        name: "example".to_string(),
        domain: "*.example.com".to_string(),
        seeds: vec!["https://www.example.com/node/1".to_string()],
        url_pattern: r"^https://www\.example\.com/node/\d+$".to_string(),
        content_selectors: vec!["article".to_string()],
        error_selectors: vec![".page-not-found".to_string()],
        error_phrases: vec!["not found".to_string()],
        min_content_length: 5,
    }
}

/// A valid article page linking to `links`
pub fn article(title: &str, links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!("<a href=\"{}\">link</a>", href))
        .collect();
    format!(
        "<html><head><title>{title}</title></head><body><h1>{title}</h1>\
         <article><p>Body text of {title}.</p></article>{anchors}</body></html>"
    )
}

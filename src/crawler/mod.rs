//! Crawler module for fetching, validating and scheduling article downloads
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching behind the [`Fetcher`] trait
//! - Site adapters that validate pages and extract articles and links
//! - The frontier queue and the retrying worker
//! - Batch scheduling with bounded concurrency
//! - Overall crawl coordination

mod adapter;
mod coordinator;
mod fetcher;
mod frontier;
mod parser;
mod retry;
mod scheduler;
mod worker;

#[cfg(test)]
mod testing;

pub use adapter::{AdapterError, Extraction, HtmlAdapter, SiteAdapter};
pub use coordinator::{run_crawl, Coordinator, CrawlOutcome, RunOptions};
pub use fetcher::{build_http_client, Fetcher, HttpFetcher, RawPage, TransportError};
pub use frontier::Frontier;
pub use parser::{extract_body, extract_links, extract_title};
pub use retry::RetryPolicy;
pub use scheduler::{RunReport, Scheduler, SchedulerConfig, SchedulerState};
pub use worker::{FetchError, ProcessedPage, Worker};

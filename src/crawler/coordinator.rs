//! Crawler coordinator - main crawl orchestration logic
//!
//! This module wires one crawl target together:
//! - Opening the tracker logs, candidate file and artifact directory
//! - Seeding and rebuilding the frontier
//! - Opening the checkpoint, fresh or resumed
//! - Running the scheduler until it stops
//! - Finalizing the checkpoint and writing the summary report

use crate::config::Config;
use crate::crawler::adapter::HtmlAdapter;
use crate::crawler::fetcher::{Fetcher, HttpFetcher};
use crate::crawler::frontier::Frontier;
use crate::crawler::retry::RetryPolicy;
use crate::crawler::scheduler::{RunReport, Scheduler, SchedulerConfig};
use crate::crawler::worker::Worker;
use crate::output::{generate_markdown_summary, Checkpoint, CheckpointRecorder, CrawlStatistics};
use crate::state::RunStatus;
use crate::storage::{open_storage, OpenMode, UrlTracker};
use crate::url::{canonicalize, CanonicalUrl};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// How a run treats state left by earlier runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Clear tracker logs, candidate file and checkpoint first
    pub fresh: bool,

    /// Continue the previous checkpoint's counters
    pub resume: bool,

    /// Forget failed URLs so they are fetched again
    pub reset_errors: bool,

    /// Keep timestamped copies of the tracker logs before opening them
    pub backup: bool,
}

/// Result of a finished run
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub report: RunReport,
    pub checkpoint: Checkpoint,
}

impl CrawlOutcome {
    pub fn status(&self) -> RunStatus {
        self.report.status
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    tracker: Arc<UrlTracker>,
    checkpoint: Arc<CheckpointRecorder>,
    scheduler: Scheduler,
}

impl Coordinator {
    /// Creates a coordinator fetching over HTTP
    ///
    /// # Arguments
    ///
    /// * `config` - The validated crawler configuration
    /// * `options` - Fresh, resume and reset-errors switches
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(HarvestError)` - Storage, adapter or HTTP client setup failed
    pub fn new(config: Config, options: RunOptions) -> crate::Result<Self> {
        let fetcher = Arc::new(HttpFetcher::from_config(&config.user_agent)?);
        Self::with_fetcher(config, options, fetcher)
    }

    /// Creates a coordinator around any [`Fetcher`]
    pub fn with_fetcher(
        config: Config,
        options: RunOptions,
        fetcher: Arc<dyn Fetcher>,
    ) -> crate::Result<Self> {
        let storage = open_storage(
            &config.output,
            OpenMode {
                fresh: options.fresh,
                reset_errors: options.reset_errors,
                backup: options.backup,
            },
        )?;
        let tracker = storage.tracker.clone();

        let seeds = canonical_seeds(&config.site.seeds);
        if storage.candidates.seed_if_empty(&seeds)? && !seeds.is_empty() {
            tracing::info!(
                "Seeded {} with {} URLs",
                storage.candidates.path().display(),
                seeds.len()
            );
        }
        let stored = storage.candidates.load()?;
        tracing::info!(
            "Loaded {} candidates, {} completed and {} failed URLs",
            stored.len(),
            tracker.completed_count(),
            tracker.failed_count()
        );
        let frontier = Frontier::seeded(stored.into_iter().chain(seeds), &tracker)
            .with_candidate_file(storage.candidates.clone());

        let resume = options.resume && !options.fresh;
        let checkpoint = Arc::new(CheckpointRecorder::open(
            &config.output.checkpoint_file,
            resume,
        ));

        let adapter = Arc::new(HtmlAdapter::from_config(&config.site)?);
        let worker = Worker::new(
            fetcher,
            adapter,
            storage.sink.clone(),
            tracker.clone(),
            RetryPolicy::from_config(&config.crawler),
            config.crawler.request_timeout_duration(),
        );
        let scheduler = Scheduler::new(
            SchedulerConfig::from(&config.crawler),
            worker,
            frontier,
            checkpoint.clone(),
        );

        Ok(Self {
            config: Arc::new(config),
            tracker,
            checkpoint,
            scheduler,
        })
    }

    /// Runs the crawl until the frontier is exhausted, the cap is reached
    /// or `shutdown` turns true
    ///
    /// Per-URL failures never end the run early. The checkpoint is always
    /// finalized and the summary report always attempted.
    pub async fn run(mut self, shutdown: watch::Receiver<bool>) -> crate::Result<CrawlOutcome> {
        tracing::info!(
            "Crawling {} ({} pending URLs)",
            self.config.site.name,
            self.scheduler.frontier().len()
        );

        let report = if self.scheduler.frontier().is_empty()
            && self.tracker.completed_count() + self.tracker.failed_count() == 0
        {
            tracing::error!("Nothing to crawl: no candidates, no seeds and no tracked URLs");
            RunReport {
                status: RunStatus::Failed,
                batches: 0,
                succeeded: 0,
                failed: 0,
                recovered: 0,
                links_added: 0,
                elapsed: Duration::ZERO,
                error: Some("empty frontier".to_string()),
            }
        } else {
            self.scheduler.run(shutdown).await
        };

        let checkpoint = self.checkpoint.finalize(report.status);
        tracing::info!(
            "Run {} after {:.1}s: {} succeeded ({} recovered), {} failed, {} new links",
            report.status,
            report.elapsed.as_secs_f64(),
            report.succeeded,
            report.recovered,
            report.failed,
            report.links_added
        );

        let stats = CrawlStatistics::collect(
            &self.config.site.name,
            Some(checkpoint.clone()),
            &self.tracker,
            self.scheduler.frontier().len() as u64,
        );
        if let Err(e) = generate_markdown_summary(&stats, Path::new(&self.config.output.summary_path)) {
            tracing::warn!("Failed to write summary report: {}", e);
        }

        Ok(CrawlOutcome { report, checkpoint })
    }
}

/// Canonicalizes configured seeds, skipping any that do not parse
fn canonical_seeds(seeds: &[String]) -> Vec<CanonicalUrl> {
    seeds
        .iter()
        .filter_map(|seed| match canonicalize(seed) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!("Ignoring seed {}: {}", seed, e);
                None
            }
        })
        .collect()
}

/// Runs a complete crawl over HTTP
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `options` - Fresh, resume and reset-errors switches
/// * `shutdown` - Turns true when the run should stop after the current batch
pub async fn run_crawl(
    config: Config,
    options: RunOptions,
    shutdown: watch::Receiver<bool>,
) -> crate::Result<CrawlOutcome> {
    Coordinator::new(config, options)?.run(shutdown).await
}

//! Statistics gathered from a crawl target's files
//!
//! This module provides functionality for reading the checkpoint, tracker
//! logs and candidate file of a crawl target and displaying the result.

use crate::config::Config;
use crate::output::checkpoint::{Checkpoint, CheckpointRecorder};
use crate::state::RunStatus;
use crate::storage::{CandidateFile, StorageResult, UrlTracker};
use chrono::{DateTime, Utc};
use std::path::Path;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Site name from `[site]`
    pub site: String,

    /// Last checkpoint, if one was ever written
    pub checkpoint: Option<Checkpoint>,

    /// URLs in the completed log
    pub completed: u64,

    /// URLs in the failed log
    pub failed: u64,

    /// Candidates not yet tracked
    pub pending: u64,

    /// Failure reasons and how often each occurred, most frequent first
    pub failure_reasons: Vec<(String, u64)>,
}

impl CrawlStatistics {
    /// Builds statistics from live crawl state
    pub fn collect(
        site: &str,
        checkpoint: Option<Checkpoint>,
        tracker: &UrlTracker,
        pending: u64,
    ) -> Self {
        Self {
            site: site.to_string(),
            checkpoint,
            completed: tracker.completed_count() as u64,
            failed: tracker.failed_count() as u64,
            pending,
            failure_reasons: tracker.failure_summary(),
        }
    }

    /// URLs that reached a terminal state
    pub fn processed(&self) -> u64 {
        self.completed + self.failed
    }

    /// Completed share of tracked URLs, in percent
    pub fn success_rate(&self) -> f64 {
        if self.processed() == 0 {
            return 0.0;
        }
        self.completed as f64 / self.processed() as f64 * 100.0
    }

    pub fn status(&self) -> Option<RunStatus> {
        self.checkpoint.as_ref().map(|c| c.status)
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.checkpoint.as_ref().map(|c| c.started_at)
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.checkpoint.as_ref().and_then(|c| c.ended_at)
    }

    pub fn runtime_seconds(&self) -> Option<f64> {
        self.checkpoint
            .as_ref()
            .and_then(|c| c.statistics.as_ref())
            .map(|s| s.runtime_seconds)
    }
}

/// Loads statistics for the crawl target described by `config`
///
/// # Arguments
///
/// * `config` - Validated configuration; only `[site]` and `[output]` are read
///
/// Nothing is created or rewritten, so this may run next to a live crawl.
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - A tracker log or the candidate file is unreadable
pub fn load_statistics(config: &Config) -> StorageResult<CrawlStatistics> {
    let output = &config.output;
    let tracker = UrlTracker::snapshot(
        Path::new(&output.track_file),
        Path::new(&output.failed_file),
    )?;
    let candidates = CandidateFile::new(&output.urls_file).load()?;
    let pending = candidates
        .iter()
        .filter(|url| !tracker.is_tracked(url))
        .count() as u64;
    let checkpoint = CheckpointRecorder::load(Path::new(&output.checkpoint_file));

    Ok(CrawlStatistics::collect(
        &config.site.name,
        checkpoint,
        &tracker,
        pending,
    ))
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics: {} ===\n", stats.site);

    match &stats.checkpoint {
        Some(checkpoint) => {
            println!("Last Run:");
            println!("  Status: {}", checkpoint.status);
            println!("  Started: {}", checkpoint.started_at.to_rfc3339());
            println!("  Last updated: {}", checkpoint.last_updated.to_rfc3339());
            if let Some(ended) = checkpoint.ended_at {
                println!("  Ended: {}", ended.to_rfc3339());
            }
            println!(
                "  Run counters: {} completed, {} failed of {} known",
                checkpoint.completed_articles,
                checkpoint.failed_articles,
                checkpoint.total_articles
            );
            if let Some(runtime) = stats.runtime_seconds() {
                println!("  Runtime: {:.1}s", runtime);
            }
        }
        None => println!("No checkpoint found"),
    }
    println!();

    println!("Tracked URLs:");
    println!("  Completed: {}", stats.completed);
    println!("  Failed: {}", stats.failed);
    println!("  Pending candidates: {}", stats.pending);
    println!();

    if !stats.failure_reasons.is_empty() {
        println!("Failure Reasons:");
        for (reason, count) in stats.failure_reasons.iter().take(20) {
            println!("  {:>6}  {}", count, reason);
        }
        println!();
    }

    println!(
        "Success Rate: {:.1}% ({} / {} URLs completed)",
        stats.success_rate(),
        stats.completed,
        stats.processed()
    );
}

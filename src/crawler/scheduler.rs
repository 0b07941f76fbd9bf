//! Batch scheduler with bounded concurrency
//!
//! This module handles:
//! - Draining the frontier in batches, with a barrier after each batch
//! - Global concurrency limiting via a semaphore
//! - Enforcing the download cap across runs
//! - Merging discovered links before the next dispatch
//! - Observing the interrupt flag between batches

use crate::config::CrawlerConfig;
use crate::crawler::frontier::Frontier;
use crate::crawler::retry::uniform_between;
use crate::crawler::worker::{FetchError, ProcessedPage, Worker};
use crate::output::CheckpointRecorder;
use crate::state::{RunStatus, TrackedState};
use crate::url::CanonicalUrl;
use crate::HarvestError;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Lifecycle of a scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Completed,
    Interrupted,
    Error,
}

impl SchedulerState {
    /// Checkpoint status for a scheduler that stopped in this state
    pub fn run_status(&self) -> RunStatus {
        match self {
            Self::Idle | Self::Running => RunStatus::Running,
            Self::Completed => RunStatus::Completed,
            Self::Interrupted => RunStatus::Interrupted,
            Self::Error => RunStatus::Error,
        }
    }
}

/// Scheduling limits, taken from `[crawler]`
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub concurrent_requests: usize,
    pub batch_size: usize,
    pub max_downloads: u64,
    pub inter_batch_delay_min: Duration,
    pub inter_batch_delay_max: Duration,
}

impl From<&CrawlerConfig> for SchedulerConfig {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            concurrent_requests: config.concurrent_requests,
            batch_size: config.batch_size,
            max_downloads: config.max_downloads,
            inter_batch_delay_min: Duration::from_millis(config.inter_batch_delay_min),
            inter_batch_delay_max: Duration::from_millis(config.inter_batch_delay_max),
        }
    }
}

/// What a run accomplished
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub status: RunStatus,
    pub batches: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub recovered: u64,
    pub links_added: u64,
    pub elapsed: Duration,
    pub error: Option<String>,
}

#[derive(Default)]
struct BatchOutcome {
    succeeded: u64,
    failed: u64,
    recovered: u64,
    discovered: Vec<CanonicalUrl>,
    panicked: Option<String>,
}

/// Drives workers over the frontier until it is exhausted, the cap is
/// reached or an interrupt is observed
pub struct Scheduler {
    config: SchedulerConfig,
    worker: Worker,
    frontier: Frontier,
    checkpoint: Arc<CheckpointRecorder>,

    /// Global semaphore for limiting concurrent fetches
    semaphore: Arc<Semaphore>,

    state: SchedulerState,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        worker: Worker,
        frontier: Frontier,
        checkpoint: Arc<CheckpointRecorder>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.concurrent_requests.max(1)));
        Self {
            config,
            worker,
            frontier,
            checkpoint,
            semaphore,
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    /// Runs batches until a terminal state is reached
    ///
    /// In-flight workers always finish; `shutdown` is only consulted
    /// between batches and during the inter-batch pause.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> RunReport {
        let started = Instant::now();
        let tracker = self.worker.tracker().clone();
        let mut report = RunReport {
            status: RunStatus::Running,
            batches: 0,
            succeeded: 0,
            failed: 0,
            recovered: 0,
            links_added: 0,
            elapsed: Duration::ZERO,
            error: None,
        };

        self.state = SchedulerState::Running;
        self.update_total();
        tracing::info!(
            "Starting crawl: {} pending, {} already completed, cap {}",
            self.frontier.len(),
            tracker.completed_count(),
            self.config.max_downloads
        );

        loop {
            if *shutdown.borrow() {
                tracing::info!("Interrupt received, stopping before next batch");
                self.state = SchedulerState::Interrupted;
                break;
            }

            let completed = tracker.completed_count() as u64;
            if completed >= self.config.max_downloads {
                tracing::info!(
                    "Download cap reached ({} >= {})",
                    completed,
                    self.config.max_downloads
                );
                self.state = SchedulerState::Completed;
                break;
            }

            if self.frontier.is_empty() {
                tracing::info!("Frontier exhausted");
                self.state = SchedulerState::Completed;
                break;
            }

            let allowance = usize::try_from(self.config.max_downloads - completed).unwrap_or(usize::MAX);
            let batch = self
                .frontier
                .dequeue_batch(self.config.batch_size.min(allowance));
            report.batches += 1;
            tracing::debug!("Dispatching batch {} ({} URLs)", report.batches, batch.len());

            let outcome = self.run_batch(batch).await;

            let added = self.frontier.enqueue(outcome.discovered, &tracker) as u64;
            report.succeeded += outcome.succeeded;
            report.failed += outcome.failed;
            report.recovered += outcome.recovered;
            report.links_added += added;

            self.checkpoint.update(outcome.succeeded, outcome.failed);
            self.update_total();
            self.log_progress(&report, started.elapsed());

            if let Some(message) = outcome.panicked {
                let error = HarvestError::WorkerPanic(message);
                tracing::error!("Aborting run: {}", error);
                report.error = Some(error.to_string());
                self.state = SchedulerState::Error;
                break;
            }

            let capped = tracker.completed_count() as u64 >= self.config.max_downloads;
            if !capped && !self.frontier.is_empty() {
                self.pause(&mut shutdown).await;
            }
        }

        report.status = self.state.run_status();
        report.elapsed = started.elapsed();
        report
    }

    /// Spawns one task per URL and waits for all of them
    async fn run_batch(&mut self, batch: Vec<CanonicalUrl>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let mut outstanding: HashSet<CanonicalUrl> = batch.iter().cloned().collect();
        let mut tasks: JoinSet<(CanonicalUrl, Result<ProcessedPage, FetchError>)> = JoinSet::new();

        for url in batch {
            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    outcome.panicked = Some(format!("semaphore closed: {}", e));
                    break;
                }
            };
            let worker = self.worker.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let result = worker.process(url.clone()).await;
                (url, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (url, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    outcome.panicked.get_or_insert_with(|| e.to_string());
                    continue;
                }
            };
            outstanding.remove(&url);

            let state = match result {
                Ok(page) => {
                    outcome.succeeded += 1;
                    if page.recovered {
                        outcome.recovered += 1;
                    }
                    outcome.discovered.extend(page.links);
                    TrackedState::Completed
                }
                Err(_) => {
                    outcome.failed += 1;
                    TrackedState::Failed
                }
            };

            if let Err(e) = self.frontier.settle(&url, state) {
                tracing::error!("Frontier out of sync for {}: {}", url, e);
            }
        }

        // URLs whose task died, or that never got a permit
        for url in outstanding {
            self.frontier.release(&url);
        }

        outcome
    }

    /// Sleeps between batches, waking early on interrupt
    async fn pause(&self, shutdown: &mut watch::Receiver<bool>) {
        let delay = uniform_between(
            self.config.inter_batch_delay_min,
            self.config.inter_batch_delay_max,
            &mut rand::thread_rng(),
        );
        if delay.is_zero() {
            return;
        }

        tracing::debug!("Pausing {:?} before next batch", delay);
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        tokio::select! {
            _ = &mut sleep => {}
            changed = shutdown.changed() => {
                // A dropped sender can never interrupt; finish the pause
                if changed.is_err() {
                    sleep.await;
                }
            }
        }
    }

    fn update_total(&self) {
        let tracker = self.worker.tracker();
        let total = tracker.completed_count()
            + tracker.failed_count()
            + self.frontier.len()
            + self.frontier.in_flight_len();
        self.checkpoint.set_total(total as u64);
    }

    fn log_progress(&self, report: &RunReport, elapsed: Duration) {
        let processed = report.succeeded + report.failed;
        let rate = if elapsed.as_secs_f64() > 0.0 {
            processed as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let completed = self.worker.tracker().completed_count() as u64;
        let remaining = (self.frontier.len() as u64)
            .min(self.config.max_downloads.saturating_sub(completed));
        let eta = if rate > 0.0 {
            format!("{:.0}s", remaining as f64 / rate)
        } else {
            "unknown".to_string()
        };

        tracing::info!(
            "Batch {}: {} succeeded, {} failed, {} pending, {:.2} URLs/s, ETA {}",
            report.batches,
            report.succeeded,
            report.failed,
            self.frontier.len(),
            rate,
            eta
        );
    }
}

//! Progress checkpoint
//!
//! A small JSON document describing the current run. It is rewritten
//! atomically after every batch so an external observer, or the next run,
//! always sees a complete record.

use crate::state::RunStatus;
use crate::storage::{write_atomic, StorageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

/// Derived figures written when a run ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Completed share of processed URLs, formatted `NN.NN%`
    pub success_rate: String,
    pub total_processed: u64,
    pub runtime_seconds: f64,
}

/// On-disk progress record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub started_at: DateTime<Utc>,
    pub total_articles: u64,
    pub completed_articles: u64,
    pub failed_articles: u64,
    pub status: RunStatus,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<RunStatistics>,
}

impl Checkpoint {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            started_at: now,
            total_articles: 0,
            completed_articles: 0,
            failed_articles: 0,
            status: RunStatus::Running,
            last_updated: now,
            ended_at: None,
            statistics: None,
        }
    }

    pub fn processed(&self) -> u64 {
        self.completed_articles + self.failed_articles
    }

    /// Completed share of processed URLs, formatted `NN.NN%`
    pub fn success_rate(&self) -> String {
        let processed = self.processed();
        if processed == 0 {
            return "0.00%".to_string();
        }
        format!(
            "{:.2}%",
            self.completed_articles as f64 / processed as f64 * 100.0
        )
    }
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupted checkpoint: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Failed to write checkpoint: {0}")]
    Write(#[from] StorageError),
}

/// Serialized, atomically persisted access to one checkpoint file
pub struct CheckpointRecorder {
    path: PathBuf,
    state: Mutex<Checkpoint>,
}

impl CheckpointRecorder {
    /// Opens the checkpoint at `path`
    ///
    /// With `resume`, an existing record's counters and start time carry
    /// over and its status goes back to running. A missing or corrupted
    /// file, or `resume == false`, starts a fresh record.
    pub fn open(path: impl Into<PathBuf>, resume: bool) -> Self {
        let path = path.into();
        let now = Utc::now();

        let checkpoint = if resume {
            match read_checkpoint(&path) {
                Ok(Some(mut previous)) => {
                    tracing::info!(
                        "Resuming checkpoint from {} ({} completed, {} failed, last status {})",
                        previous.started_at.to_rfc3339(),
                        previous.completed_articles,
                        previous.failed_articles,
                        previous.status
                    );
                    previous.status = RunStatus::Running;
                    previous.last_updated = now;
                    previous.ended_at = None;
                    previous.statistics = None;
                    previous
                }
                Ok(None) => Checkpoint::new(now),
                Err(e) => {
                    tracing::warn!(
                        "Checkpoint {} unreadable, starting fresh: {}",
                        path.display(),
                        e
                    );
                    Checkpoint::new(now)
                }
            }
        } else {
            Checkpoint::new(now)
        };

        let recorder = Self {
            path,
            state: Mutex::new(checkpoint),
        };
        recorder.write(&recorder.lock());
        recorder
    }

    /// Reads a checkpoint without opening a recorder
    ///
    /// Returns None if the file is missing or cannot be parsed.
    pub fn load(path: &Path) -> Option<Checkpoint> {
        match read_checkpoint(path) {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                tracing::warn!("Failed to read checkpoint {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Checkpoint> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds to the completed and failed counters
    pub fn update(&self, completed_delta: u64, failed_delta: u64) {
        let mut state = self.lock();
        state.completed_articles += completed_delta;
        state.failed_articles += failed_delta;
        state.last_updated = Utc::now();
        self.write(&state);
    }

    /// Records the number of URLs known to the run
    pub fn set_total(&self, total: u64) {
        let mut state = self.lock();
        state.total_articles = total;
        state.last_updated = Utc::now();
        self.write(&state);
    }

    /// Marks the run finished and computes its statistics
    pub fn finalize(&self, status: RunStatus) -> Checkpoint {
        let mut state = self.lock();
        let now = Utc::now();

        state.status = status;
        state.ended_at = Some(now);
        state.last_updated = now;
        state.statistics = Some(RunStatistics {
            success_rate: state.success_rate(),
            total_processed: state.processed(),
            runtime_seconds: (now - state.started_at).num_milliseconds().max(0) as f64 / 1000.0,
        });

        self.write(&state);
        tracing::info!(
            "Run {}: {} completed, {} failed ({})",
            status,
            state.completed_articles,
            state.failed_articles,
            state.success_rate()
        );
        state.clone()
    }

    pub fn snapshot(&self) -> Checkpoint {
        self.lock().clone()
    }

    /// Persists the record; failures are logged, never propagated
    fn write(&self, checkpoint: &Checkpoint) {
        let result = serde_json::to_string_pretty(checkpoint)
            .map_err(CheckpointError::from)
            .and_then(|json| write_atomic(&self.path, &json).map_err(CheckpointError::from));

        if let Err(e) = result {
            tracing::warn!("Failed to write checkpoint {}: {}", self.path.display(), e);
        }
    }
}

fn read_checkpoint(path: &Path) -> Result<Option<Checkpoint>, CheckpointError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if content.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&content)?))
}

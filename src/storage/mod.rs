//! Storage module for persisting crawl data
//!
//! This module handles every durable file the crawler owns:
//! - The completed and failed logs behind the URL tracker
//! - The candidate URL file that seeds the frontier
//! - Markdown artifacts, written atomically
//!
//! The checkpoint file lives in `output::checkpoint` but reuses
//! [`write_atomic`] from here.

mod artifact;
mod candidates;
mod tracker;
mod traits;

pub use artifact::{artifact_stem, ensure_output_dir, write_atomic, FsArtifactSink};
pub use candidates::CandidateFile;
pub use tracker::{FailureRecord, UrlTracker};
pub use traits::{Artifact, ArtifactSink, StorageError, StorageResult};

use crate::config::OutputConfig;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// All durable state for one crawl target
pub struct CrawlStorage {
    pub tracker: Arc<UrlTracker>,
    pub candidates: CandidateFile,
    pub sink: Arc<FsArtifactSink>,
}

/// How existing state should be treated when opening storage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenMode {
    /// Forget all tracked and candidate URLs (artifacts are kept)
    pub fresh: bool,

    /// Forget failed URLs so they are retried
    pub reset_errors: bool,

    /// Copy the tracker logs aside before anything else touches them
    pub backup: bool,
}

/// Opens tracker, candidate file and artifact sink for a crawl target
///
/// # Arguments
///
/// * `output` - Output section of the configuration
/// * `mode` - Whether to wipe tracked state before opening
///
/// # Returns
///
/// * `Ok(CrawlStorage)` - Storage ready for the coordinator
/// * `Err(StorageError)` - A log or the download directory is unusable
pub fn open_storage(output: &OutputConfig, mode: OpenMode) -> StorageResult<CrawlStorage> {
    if mode.backup {
        for path in backup_tracking_files(output)? {
            tracing::info!("Backed up tracker log to {}", path.display());
        }
    }

    let sink = FsArtifactSink::new(&output.download_dir)?;
    let tracker = UrlTracker::load(Path::new(&output.track_file), Path::new(&output.failed_file))?;
    let candidates = CandidateFile::new(&output.urls_file);

    if mode.fresh {
        tracing::info!("Fresh start: clearing tracker logs and candidate file");
        tracker.reset_all()?;
        candidates.truncate()?;
    } else if mode.reset_errors {
        tracker.reset_failed()?;
    }

    Ok(CrawlStorage {
        tracker: Arc::new(tracker),
        candidates,
        sink: Arc::new(sink),
    })
}

/// Copies each non-empty tracker log to `<log>.<timestamp>.bak`
///
/// Returns the backup paths written. Missing or empty logs are skipped.
pub fn backup_tracking_files(output: &OutputConfig) -> StorageResult<Vec<PathBuf>> {
    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    let mut written = Vec::new();
    for log in [&output.track_file, &output.failed_file] {
        let source = Path::new(log);
        match std::fs::metadata(source) {
            Ok(meta) if meta.len() > 0 => {}
            Ok(_) => continue,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        }
        let target = PathBuf::from(format!("{}.{}.bak", log, stamp));
        std::fs::copy(source, &target)?;
        written.push(target);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::canonicalize;
    use chrono::Utc;
    use tempfile::TempDir;

    fn output(dir: &TempDir) -> OutputConfig {
        let p = |name: &str| dir.path().join(name).to_string_lossy().into_owned();
        OutputConfig {
            download_dir: p("articles"),
            track_file: p("tracked.txt"),
            failed_file: p("failed.tsv"),
            urls_file: p("urls.txt"),
            checkpoint_file: p("progress.json"),
            summary_path: p("summary.md"),
        }
    }

    #[test]
    fn test_open_storage_creates_layout() {
        let dir = TempDir::new().unwrap();
        let out = output(&dir);
        let storage = open_storage(&out, OpenMode::default()).unwrap();

        assert!(dir.path().join("articles").is_dir());
        assert!(dir.path().join("tracked.txt").exists());
        assert_eq!(storage.tracker.completed_count(), 0);
    }

    #[test]
    fn test_open_modes() {
        let dir = TempDir::new().unwrap();
        let out = output(&dir);
        let done = canonicalize("https://a.com/1").unwrap();
        let bad = canonicalize("https://a.com/2").unwrap();
        {
            let storage = open_storage(&out, OpenMode::default()).unwrap();
            storage.tracker.mark_completed(&done).unwrap();
            storage.tracker.mark_failed(&bad, "boom", Utc::now()).unwrap();
            storage.candidates.append(&[done.clone(), bad.clone()]).unwrap();
        }

        let storage = open_storage(
            &out,
            OpenMode {
                reset_errors: true,
                ..OpenMode::default()
            },
        )
        .unwrap();
        assert!(storage.tracker.is_completed(&done));
        assert!(!storage.tracker.is_tracked(&bad));
        drop(storage);

        let storage = open_storage(
            &out,
            OpenMode {
                fresh: true,
                ..OpenMode::default()
            },
        )
        .unwrap();
        assert_eq!(storage.tracker.completed_count(), 0);
        assert!(storage.candidates.load().unwrap().is_empty());
    }

    #[test]
    fn test_backup_before_fresh_start() {
        let dir = TempDir::new().unwrap();
        let out = output(&dir);
        std::fs::write(&out.track_file, "https://a.com/1\n").unwrap();

        let storage = open_storage(
            &out,
            OpenMode {
                fresh: true,
                backup: true,
                ..OpenMode::default()
            },
        )
        .unwrap();
        assert_eq!(storage.tracker.completed_count(), 0);

        let backups: Vec<PathBuf> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.extension().map_or(false, |ext| ext == "bak"))
            .collect();
        // The failed log was empty, so only the completed log is copied
        assert_eq!(backups.len(), 1);
        let name = backups[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("tracked.txt."));
        assert_eq!(std::fs::read_to_string(&backups[0]).unwrap(), "https://a.com/1\n");
    }

    #[test]
    fn test_backup_skips_missing_logs() {
        let dir = TempDir::new().unwrap();
        assert!(backup_tracking_files(&output(&dir)).unwrap().is_empty());
    }
}

//! Durable URL tracker
//!
//! The tracker is the single source of truth for "already done" queries.
//! Completed URLs are appended one per line to the completed log; failed
//! URLs go to a separate tab-separated log (`url<TAB>timestamp<TAB>reason`).
//! Every mark appends to the log before the in-memory set changes, and both
//! happen under one mutex, so the set rebuilt by [`UrlTracker::load`] after
//! a crash never misses a URL that was reported complete.

use crate::storage::traits::{StorageError, StorageResult};
use crate::url::CanonicalUrl;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Why and when a URL was given up on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub timestamp: String,
    pub reason: String,
}

/// Append-only line log; `None` file means an in-memory tracker
struct LogFile {
    path: Option<PathBuf>,
    file: Option<File>,
}

impl LogFile {
    fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        drop_partial_tail(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            file: Some(file),
        })
    }

    fn detached() -> Self {
        Self {
            path: None,
            file: None,
        }
    }

    fn append(&mut self, line: &str) -> StorageResult<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_data()?;
        Ok(())
    }

    fn truncate(&mut self) -> StorageResult<()> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        File::create(path)?;
        self.file = Some(OpenOptions::new().append(true).open(path)?);
        Ok(())
    }
}

struct TrackerInner {
    completed: HashSet<CanonicalUrl>,
    failed: HashMap<CanonicalUrl, FailureRecord>,
    completed_log: LogFile,
    failed_log: LogFile,
}

/// Crash-safe set of completed and failed URLs
pub struct UrlTracker {
    inner: Mutex<TrackerInner>,
}

impl UrlTracker {
    /// Reconstructs tracker state from the completed and failed logs
    ///
    /// Missing files are created empty. Blank lines, lines that are not
    /// valid URLs, and a partial trailing line left by a crash mid-write are
    /// skipped with a warning.
    pub fn load(completed_path: &Path, failed_path: &Path) -> StorageResult<Self> {
        let (completed, failed) = read_state(completed_path, failed_path)?;
        Ok(Self {
            inner: Mutex::new(TrackerInner {
                completed,
                failed,
                completed_log: LogFile::open(completed_path)?,
                failed_log: LogFile::open(failed_path)?,
            }),
        })
    }

    /// Reads tracker state without touching the files
    ///
    /// Missing logs count as empty and a partial tail is left in place, so
    /// this is safe while another process is appending. Marks made on a
    /// snapshot stay in memory.
    pub fn snapshot(completed_path: &Path, failed_path: &Path) -> StorageResult<Self> {
        let (completed, failed) = read_state(completed_path, failed_path)?;
        Ok(Self {
            inner: Mutex::new(TrackerInner {
                completed,
                failed,
                completed_log: LogFile::detached(),
                failed_log: LogFile::detached(),
            }),
        })
    }

    /// Creates a tracker with no backing files
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(TrackerInner {
                completed: HashSet::new(),
                failed: HashMap::new(),
                completed_log: LogFile::detached(),
                failed_log: LogFile::detached(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerInner> {
        // A worker that panicked mid-mark leaves the sets consistent with
        // the log, so poisoning is ignored
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns true if the URL is Completed or Failed
    pub fn is_tracked(&self, url: &CanonicalUrl) -> bool {
        let inner = self.lock();
        inner.completed.contains(url) || inner.failed.contains_key(url)
    }

    pub fn is_completed(&self, url: &CanonicalUrl) -> bool {
        self.lock().completed.contains(url)
    }

    pub fn is_failed(&self, url: &CanonicalUrl) -> bool {
        self.lock().failed.contains_key(url)
    }

    pub fn completed_count(&self) -> usize {
        self.lock().completed.len()
    }

    pub fn failed_count(&self) -> usize {
        self.lock().failed.len()
    }

    /// Records a URL as completed
    ///
    /// Idempotent: returns `Ok(false)` if the URL was already completed.
    /// On a log write failure the in-memory set still records the URL and
    /// the error is returned so the caller can warn; at worst the URL is
    /// fetched once more after a restart.
    pub fn mark_completed(&self, url: &CanonicalUrl) -> StorageResult<bool> {
        let mut inner = self.lock();
        if inner.completed.contains(url) {
            return Ok(false);
        }

        let written = inner.completed_log.append(url.as_str());
        inner.failed.remove(url);
        inner.completed.insert(url.clone());

        if let Err(e) = written {
            tracing::warn!("Failed to append {} to completed log: {}", url, e);
            return Err(e);
        }
        Ok(true)
    }

    /// Records a URL as permanently failed
    ///
    /// Completed URLs are never downgraded. Tabs and newlines in the reason
    /// are flattened so the log stays one record per line.
    pub fn mark_failed(
        &self,
        url: &CanonicalUrl,
        reason: &str,
        timestamp: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let mut inner = self.lock();
        if inner.completed.contains(url) || inner.failed.contains_key(url) {
            return Ok(false);
        }

        let reason = flatten(reason);
        let timestamp = timestamp.to_rfc3339();
        let written = inner
            .failed_log
            .append(&format!("{}\t{}\t{}", url, timestamp, reason));
        inner
            .failed
            .insert(url.clone(), FailureRecord { timestamp, reason });

        if let Err(e) = written {
            tracing::warn!("Failed to append {} to failed log: {}", url, e);
            return Err(e);
        }
        Ok(true)
    }

    /// Forgets every failed URL so this run may retry them
    ///
    /// Returns the number of URLs released.
    pub fn reset_failed(&self) -> StorageResult<usize> {
        let mut inner = self.lock();
        let released = inner.failed.len();
        inner.failed.clear();
        inner.failed_log.truncate()?;
        tracing::info!("Reset {} previously failed URLs", released);
        Ok(released)
    }

    /// Forgets everything, truncating both logs
    pub fn reset_all(&self) -> StorageResult<()> {
        let mut inner = self.lock();
        inner.completed.clear();
        inner.failed.clear();
        inner.completed_log.truncate()?;
        inner.failed_log.truncate()?;
        Ok(())
    }

    /// Returns the failure record for a URL
    pub fn failure(&self, url: &CanonicalUrl) -> Option<FailureRecord> {
        self.lock().failed.get(url).cloned()
    }

    /// Groups failure reasons by frequency, most common first
    pub fn failure_summary(&self) -> Vec<(String, u64)> {
        let inner = self.lock();
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for record in inner.failed.values() {
            *counts.entry(record.reason.as_str()).or_default() += 1;
        }

        let mut summary: Vec<(String, u64)> = counts
            .into_iter()
            .map(|(reason, count)| (reason.to_string(), count))
            .collect();
        summary.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        summary
    }
}

type TrackerState = (HashSet<CanonicalUrl>, HashMap<CanonicalUrl, FailureRecord>);

fn read_state(completed_path: &Path, failed_path: &Path) -> StorageResult<TrackerState> {
    let completed: HashSet<CanonicalUrl> = read_complete_lines(completed_path)?
        .into_iter()
        .filter_map(|line| parse_url_line(&line, completed_path))
        .collect();

    let mut failed = HashMap::new();
    for line in read_complete_lines(failed_path)? {
        let mut fields = line.splitn(3, '\t');
        let Some(url) = fields.next().and_then(|u| parse_url_line(u, failed_path)) else {
            continue;
        };
        if completed.contains(&url) {
            continue;
        }
        let timestamp = fields.next().unwrap_or_default().trim().to_string();
        let reason = fields.next().unwrap_or_default().trim().to_string();
        failed.insert(url, FailureRecord { timestamp, reason });
    }

    tracing::info!(
        "Loaded tracker: {} completed, {} failed",
        completed.len(),
        failed.len()
    );

    Ok((completed, failed))
}

/// Reads the newline-terminated lines of a log, dropping a partial tail
fn read_complete_lines(path: &Path) -> StorageResult<Vec<String>> {
    let content = match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(StorageError::Persistence {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        }
    };

    let mut lines: Vec<String> = content.split('\n').map(|l| l.to_string()).collect();
    // split leaves an empty piece after the final newline; anything else
    // there is a record cut short by a crash
    if let Some(tail) = lines.pop() {
        if !tail.trim().is_empty() {
            tracing::warn!(
                "Skipping partial trailing line in {}: {:?}",
                path.display(),
                tail
            );
        }
    }

    Ok(lines)
}

/// Returns true if the file exists, is non-empty and does not end in `\n`
pub(super) fn missing_final_newline(path: &Path) -> std::io::Result<bool> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Cuts a log back to its last complete line so new appends start clean
fn drop_partial_tail(path: &Path) -> StorageResult<()> {
    if !missing_final_newline(path)? {
        return Ok(());
    }
    let bytes = std::fs::read(path)?;
    let keep = bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(keep as u64)?;
    file.sync_data()?;
    Ok(())
}

fn parse_url_line(line: &str, source: &Path) -> Option<CanonicalUrl> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match CanonicalUrl::parse(trimmed) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::warn!(
                "Skipping malformed line in {}: {:?} ({})",
                source.display(),
                trimmed,
                e
            );
            None
        }
    }
}

fn flatten(reason: &str) -> String {
    reason
        .chars()
        .map(|c| if c == '\t' || c == '\n' || c == '\r' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::canonicalize;
    use tempfile::TempDir;

    fn paths(dir: &TempDir) -> (PathBuf, PathBuf) {
        (dir.path().join("tracked.txt"), dir.path().join("failed.tsv"))
    }

    fn url(s: &str) -> CanonicalUrl {
        canonicalize(s).unwrap()
    }

    #[test]
    fn test_load_missing_files_creates_them() {
        let dir = TempDir::new().unwrap();
        let (done, failed) = paths(&dir);

        let tracker = UrlTracker::load(&done, &failed).unwrap();
        assert_eq!(tracker.completed_count(), 0);
        assert!(done.exists());
        assert!(failed.exists());
    }

    #[test]
    fn test_crash_safety_round_trip() {
        let dir = TempDir::new().unwrap();
        let (done, failed) = paths(&dir);
        std::fs::write(&done, "https://a.com/x\nhttps://a.com/y\n").unwrap();

        let tracker = UrlTracker::load(&done, &failed).unwrap();
        assert_eq!(tracker.completed_count(), 2);
        assert!(tracker.is_tracked(&url("https://a.com/x")));
        assert!(tracker.is_tracked(&url("https://a.com/y")));
        assert!(!tracker.is_tracked(&url("https://a.com/z")));
    }

    #[test]
    fn test_mark_completed_survives_reload() {
        let dir = TempDir::new().unwrap();
        let (done, failed) = paths(&dir);

        {
            let tracker = UrlTracker::load(&done, &failed).unwrap();
            assert!(tracker.mark_completed(&url("https://a.com/1")).unwrap());
            assert!(tracker.mark_completed(&url("https://a.com/2/")).unwrap());
        }

        let reloaded = UrlTracker::load(&done, &failed).unwrap();
        assert!(reloaded.is_completed(&url("https://a.com/1")));
        assert!(reloaded.is_completed(&url("https://a.com/2")));
        assert_eq!(
            std::fs::read_to_string(&done).unwrap(),
            "https://a.com/1\nhttps://a.com/2\n"
        );
    }

    #[test]
    fn test_mark_completed_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let (done, failed) = paths(&dir);
        let tracker = UrlTracker::load(&done, &failed).unwrap();

        assert!(tracker.mark_completed(&url("https://a.com/1")).unwrap());
        assert!(!tracker.mark_completed(&url("https://a.com/1")).unwrap());
        assert_eq!(std::fs::read_to_string(&done).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_partial_and_malformed_lines_skipped() {
        let dir = TempDir::new().unwrap();
        let (done, failed) = paths(&dir);
        std::fs::write(&done, "https://a.com/1\n\nnot a url\nhttps://a.com/2\nhttps://a.co").unwrap();

        let tracker = UrlTracker::load(&done, &failed).unwrap();
        assert_eq!(tracker.completed_count(), 2);
        assert!(!tracker.is_tracked(&url("https://a.co")));
    }

    #[test]
    fn test_append_after_partial_line_starts_clean() {
        let dir = TempDir::new().unwrap();
        let (done, failed) = paths(&dir);
        std::fs::write(&done, "https://a.com/1\nhttps://a.co").unwrap();

        let tracker = UrlTracker::load(&done, &failed).unwrap();
        tracker.mark_completed(&url("https://a.com/2")).unwrap();
        drop(tracker);

        assert_eq!(
            std::fs::read_to_string(&done).unwrap(),
            "https://a.com/1\nhttps://a.com/2\n"
        );
        let reloaded = UrlTracker::load(&done, &failed).unwrap();
        assert_eq!(reloaded.completed_count(), 2);
    }

    #[test]
    fn test_snapshot_leaves_files_untouched() {
        let dir = TempDir::new().unwrap();
        let (done, failed) = paths(&dir);
        std::fs::write(&done, "https://a.com/1\nhttps://a.com/2").unwrap();

        let snapshot = UrlTracker::snapshot(&done, &failed).unwrap();
        assert_eq!(snapshot.completed_count(), 1);
        snapshot.mark_completed(&url("https://a.com/3")).unwrap();

        assert_eq!(
            std::fs::read_to_string(&done).unwrap(),
            "https://a.com/1\nhttps://a.com/2"
        );
        assert!(!failed.exists());
    }

    #[test]
    fn test_mark_failed_writes_tsv() {
        let dir = TempDir::new().unwrap();
        let (done, failed) = paths(&dir);
        let tracker = UrlTracker::load(&done, &failed).unwrap();
        let ts = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);

        assert!(tracker
            .mark_failed(&url("https://a.com/bad"), "HTTP 500\tserver", ts)
            .unwrap());

        let content = std::fs::read_to_string(&failed).unwrap();
        assert_eq!(
            content,
            "https://a.com/bad\t2024-01-02T03:04:05+00:00\tHTTP 500 server\n"
        );

        let reloaded = UrlTracker::load(&done, &failed).unwrap();
        let record = reloaded.failure(&url("https://a.com/bad")).unwrap();
        assert_eq!(record.reason, "HTTP 500 server");
        assert!(reloaded.is_tracked(&url("https://a.com/bad")));
    }

    #[test]
    fn test_completed_never_downgraded() {
        let tracker = UrlTracker::in_memory();
        let u = url("https://a.com/1");
        tracker.mark_completed(&u).unwrap();
        assert!(!tracker.mark_failed(&u, "late", Utc::now()).unwrap());
        assert!(tracker.is_completed(&u));
        assert!(!tracker.is_failed(&u));
    }

    #[test]
    fn test_reset_failed_releases_urls() {
        let dir = TempDir::new().unwrap();
        let (done, failed) = paths(&dir);
        let tracker = UrlTracker::load(&done, &failed).unwrap();
        let u = url("https://a.com/bad");
        tracker.mark_failed(&u, "timeout", Utc::now()).unwrap();

        assert_eq!(tracker.reset_failed().unwrap(), 1);
        assert!(!tracker.is_tracked(&u));
        assert_eq!(std::fs::read_to_string(&failed).unwrap(), "");

        // The log keeps working after truncation
        tracker.mark_failed(&u, "again", Utc::now()).unwrap();
        assert_eq!(std::fs::read_to_string(&failed).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_completed_wins_over_failed_on_load() {
        let dir = TempDir::new().unwrap();
        let (done, failed) = paths(&dir);
        std::fs::write(&done, "https://a.com/1\n").unwrap();
        std::fs::write(&failed, "https://a.com/1\t2024-01-01T00:00:00Z\told failure\n").unwrap();

        let tracker = UrlTracker::load(&done, &failed).unwrap();
        assert!(tracker.is_completed(&url("https://a.com/1")));
        assert_eq!(tracker.failed_count(), 0);
    }

    #[test]
    fn test_failure_summary_orders_by_count() {
        let tracker = UrlTracker::in_memory();
        tracker.mark_failed(&url("https://a.com/1"), "timeout", Utc::now()).unwrap();
        tracker.mark_failed(&url("https://a.com/2"), "timeout", Utc::now()).unwrap();
        tracker.mark_failed(&url("https://a.com/3"), "HTTP 404", Utc::now()).unwrap();

        let summary = tracker.failure_summary();
        assert_eq!(summary[0], ("timeout".to_string(), 2));
        assert_eq!(summary[1], ("HTTP 404".to_string(), 1));
    }

    #[test]
    fn test_concurrent_marks_do_not_interleave() {
        let dir = TempDir::new().unwrap();
        let (done, failed) = paths(&dir);
        let tracker = std::sync::Arc::new(UrlTracker::load(&done, &failed).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let u = url(&format!("https://a.com/{}/{}", t, i));
                        tracker.mark_completed(&u).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reloaded = UrlTracker::load(&done, &failed).unwrap();
        assert_eq!(reloaded.completed_count(), 200);
    }
}

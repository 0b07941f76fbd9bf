//! Candidate URL file
//!
//! A plain text file with one URL per line. It seeds the frontier at
//! startup and receives newly discovered URLs so a restarted run does not
//! lose them.

use crate::storage::tracker::missing_final_newline;
use crate::storage::traits::StorageResult;
use crate::url::CanonicalUrl;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CandidateFile {
    path: PathBuf,
}

impl CandidateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads all candidates, deduplicated in first-seen order
    ///
    /// A missing file yields no candidates. Lines that are not valid http(s)
    /// URLs are skipped.
    pub fn load(&self) -> StorageResult<Vec<CanonicalUrl>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut seen = HashSet::new();
        let mut urls = Vec::new();
        let mut skipped = 0usize;
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match CanonicalUrl::parse(line) {
                Ok(url) => {
                    if seen.insert(url.clone()) {
                        urls.push(url);
                    }
                }
                Err(_) => skipped += 1,
            }
        }

        if skipped > 0 {
            tracing::warn!(
                "Skipped {} malformed lines in {}",
                skipped,
                self.path.display()
            );
        }
        tracing::info!("Loaded {} candidate URLs from {}", urls.len(), self.path.display());
        Ok(urls)
    }

    /// Writes `seeds` when the file is missing or holds no URLs
    ///
    /// Returns true if the seeds were written.
    pub fn seed_if_empty(&self, seeds: &[CanonicalUrl]) -> StorageResult<bool> {
        if !self.load()?.is_empty() {
            return Ok(false);
        }
        self.truncate()?;
        self.append(seeds)?;
        Ok(true)
    }

    /// Appends URLs, one per line
    pub fn append(&self, urls: &[CanonicalUrl]) -> StorageResult<()> {
        if urls.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // A hand-edited file may lack its final newline
        let mut buf = String::new();
        if missing_final_newline(&self.path)? {
            buf.push('\n');
        }
        for url in urls {
            buf.push_str(url.as_str());
            buf.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(buf.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    /// Empties the file
    pub fn truncate(&self) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::File::create(&self.path)?;
        Ok(())
    }
}

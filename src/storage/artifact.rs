//! Filesystem artifact sink
//!
//! Each processed URL becomes one markdown file named
//! `{slug}--{hash16}.md`. The slug comes from the URL path and the hash from
//! the canonical URL, so names are deterministic across runs. A front-matter
//! header records the source URL, which lets the sink recognise its own
//! files after a crash and tell two URLs with the same name apart.

use crate::storage::traits::{Artifact, ArtifactSink, StorageError, StorageResult};
use crate::url::CanonicalUrl;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

/// Highest collision suffix tried before giving up
const MAX_COLLISION_SUFFIX: usize = 1000;

/// Longest slug kept, in characters
const MAX_SLUG_CHARS: usize = 80;

/// Writes artifacts as markdown files under one directory
pub struct FsArtifactSink {
    dir: PathBuf,
    // Slot lookup and write must not interleave between workers whose
    // URLs share a slug
    write_lock: Mutex<()>,
}

enum Slot {
    Free(PathBuf),
    Existing(PathBuf),
}

impl FsArtifactSink {
    /// Creates a sink, creating the directory if missing
    pub fn new(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        ensure_output_dir(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Finds the slot that belongs to `url`
    ///
    /// Walks `name.md`, `name-2.md`, `name-3.md`… until it reaches either a
    /// file whose header names `url` or a free name.
    fn resolve(&self, url: &CanonicalUrl) -> StorageResult<Slot> {
        let stem = artifact_stem(url);
        for n in 1..=MAX_COLLISION_SUFFIX {
            let name = if n == 1 {
                format!("{}.md", stem)
            } else {
                format!("{}-{}.md", stem, n)
            };
            let path = self.dir.join(name);
            if !path.exists() {
                return Ok(Slot::Free(path));
            }
            if read_source_url(&path).as_deref() == Some(url.as_str()) {
                return Ok(Slot::Existing(path));
            }
            tracing::debug!("Artifact name collision at {}", path.display());
        }

        Err(StorageError::Persistence {
            path: self.dir.join(format!("{}.md", stem)),
            message: format!("more than {} colliding names", MAX_COLLISION_SUFFIX),
        })
    }
}

impl ArtifactSink for FsArtifactSink {
    fn find(&self, url: &CanonicalUrl) -> Option<PathBuf> {
        match self.resolve(url) {
            Ok(Slot::Existing(path)) => Some(path),
            _ => None,
        }
    }

    fn persist(&self, url: &CanonicalUrl, artifact: &Artifact) -> StorageResult<PathBuf> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let path = match self.resolve(url)? {
            Slot::Free(path) | Slot::Existing(path) => path,
        };
        write_atomic(&path, &render(url, artifact))?;
        tracing::debug!("Saved {} to {}", url, path.display());
        Ok(path)
    }
}

/// Ensures the output directory exists and is writable
pub fn ensure_output_dir(dir: &Path) -> StorageResult<()> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| StorageError::OutputDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(StorageError::OutputDir(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| StorageError::OutputDir(e.to_string()))?;
    }
    NamedTempFile::new_in(dir).map_err(|e| StorageError::OutputDir(e.to_string()))?;
    Ok(())
}

/// Replaces `path` with `content` via a synced temp file and rename
///
/// Readers see either the old file or the complete new one.
pub fn write_atomic(path: &Path, content: &str) -> StorageResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;
    tmp.persist(path).map_err(|e| StorageError::Persistence {
        path: path.to_path_buf(),
        message: e.error.to_string(),
    })?;
    Ok(())
}

/// Filename without extension or collision suffix: `{slug}--{hash16}`
pub fn artifact_stem(url: &CanonicalUrl) -> String {
    format!("{}--{}", url_slug(url), short_hash(url.as_str()))
}

fn url_slug(url: &CanonicalUrl) -> String {
    let raw = url
        .to_url()
        .map(|parsed| {
            let mut joined = parsed
                .path_segments()
                .map(|segments| {
                    segments
                        .filter(|s| !s.is_empty())
                        .collect::<Vec<_>>()
                        .join("_")
                })
                .unwrap_or_default();
            if let Some(query) = parsed.query() {
                joined.push('_');
                joined.push_str(query);
            }
            joined
        })
        .unwrap_or_default();

    sanitize(&raw)
}

fn sanitize(input: &str) -> String {
    let mut compacted = String::with_capacity(input.len());
    let mut prev_underscore = false;
    for c in input.chars() {
        let c = if is_forbidden(c) { '_' } else { c };
        if c == '_' && prev_underscore {
            continue;
        }
        prev_underscore = c == '_';
        compacted.push(c);
    }

    let trimmed = compacted.trim_matches(&['_', ' ', '.'][..]);
    let mut slug: String = trimmed.chars().take(MAX_SLUG_CHARS).collect();
    if slug.is_empty() {
        slug = "index".to_string();
    }
    if is_reserved_windows_name(&slug) {
        slug.push('_');
    }
    slug
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '=' | '&' | '\0'..='\u{1F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

/// First 8 bytes of the SHA-256 digest, hex encoded
fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..8])
}

fn render(url: &CanonicalUrl, artifact: &Artifact) -> String {
    let mut out = String::new();
    out.push_str("---\n");
    out.push_str(&format!("source_url: {}\n", url));
    out.push_str(&format!("article_id: {}\n", one_line(&artifact.article_id)));
    if let Some(title) = artifact.title.as_deref() {
        out.push_str(&format!("title: {}\n", one_line(title)));
    }
    out.push_str(&format!("downloaded_at: {}\n", Utc::now().to_rfc3339()));
    out.push_str("---\n\n");
    out.push_str(artifact.body.trim());
    out.push('\n');
    out
}

fn one_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Reads `source_url` from an artifact's front matter
fn read_source_url(path: &Path) -> Option<String> {
    let file = fs::File::open(path).ok()?;
    let mut lines = BufReader::new(file).lines();

    if lines.next()?.ok()?.trim() != "---" {
        return None;
    }
    for line in lines.take(16) {
        let line = line.ok()?;
        if line.trim() == "---" {
            break;
        }
        if let Some(value) = line.strip_prefix("source_url:") {
            return Some(value.trim().to_string());
        }
    }
    None
}

//! Storage traits and error types
//!
//! This module defines the trait interface for artifact sinks and the
//! error type shared by every durable file the crawler writes.

use crate::url::CanonicalUrl;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to persist {path}: {message}")]
    Persistence { path: PathBuf, message: String },

    #[error("Output directory unusable: {0}")]
    OutputDir(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Extracted content ready to be written for one URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Title extracted from the page, if any
    pub title: Option<String>,

    /// Identifier derived from the source URL
    pub article_id: String,

    /// Extracted body text
    pub body: String,
}

/// Destination for extracted artifacts
///
/// Implementations must write each artifact atomically: after a crash a
/// reader sees either the complete artifact or nothing.
pub trait ArtifactSink: Send + Sync {
    /// Returns the location of an artifact already written for `url`
    fn find(&self, url: &CanonicalUrl) -> Option<PathBuf>;

    /// Writes the artifact for `url` and returns where it landed
    fn persist(&self, url: &CanonicalUrl, artifact: &Artifact) -> StorageResult<PathBuf>;
}

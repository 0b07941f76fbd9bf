//! Output module for run progress and crawl reports
//!
//! This module handles:
//! - The JSON checkpoint rewritten after every batch
//! - Statistics read back from a crawl target's files
//! - The markdown summary written at the end of a run

mod checkpoint;
mod markdown;
pub mod stats;

pub use checkpoint::{Checkpoint, CheckpointError, CheckpointRecorder, RunStatistics};
pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use stats::{load_statistics, print_statistics, CrawlStatistics};

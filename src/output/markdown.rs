//! Markdown summary generation
//!
//! This module generates the human-readable run report: status, timing,
//! tracked counts and the most frequent failure reasons.

use crate::output::stats::CrawlStatistics;
use crate::storage::{write_atomic, StorageResult};
use std::path::Path;

/// Failure reasons listed before the table is cut off
const MAX_FAILURE_ROWS: usize = 20;

/// Writes a markdown summary to `output_path`, replacing any previous report
///
/// # Arguments
///
/// * `stats` - Statistics of the crawl target
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(StorageError)` - Failed to write summary
pub fn generate_markdown_summary(stats: &CrawlStatistics, output_path: &Path) -> StorageResult<()> {
    let markdown = format_markdown_summary(stats);
    write_atomic(output_path, &markdown)?;
    tracing::info!("Summary written to {}", output_path.display());
    Ok(())
}

/// Formats crawl statistics as markdown
pub fn format_markdown_summary(stats: &CrawlStatistics) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Crawl Summary: {}\n\n", stats.site));

    md.push_str("## Run Information\n\n");
    match stats.status() {
        Some(status) => md.push_str(&format!("- **Status**: {}\n", status)),
        None => md.push_str("- **Status**: unknown (no checkpoint)\n"),
    }
    if let Some(started) = stats.started_at() {
        md.push_str(&format!("- **Started**: {}\n", started.to_rfc3339()));
    }
    if let Some(ended) = stats.ended_at() {
        md.push_str(&format!("- **Ended**: {}\n", ended.to_rfc3339()));
    }
    if let Some(runtime) = stats.runtime_seconds() {
        md.push_str(&format!(
            "- **Runtime**: {:.1} seconds ({:.2} minutes)\n",
            runtime,
            runtime / 60.0
        ));
    }
    md.push('\n');

    if let Some(checkpoint) = &stats.checkpoint {
        md.push_str("## Last Run\n\n");
        md.push_str("| Counter | Value |\n");
        md.push_str("|---------|-------|\n");
        md.push_str(&format!("| Known URLs | {} |\n", checkpoint.total_articles));
        md.push_str(&format!("| Completed | {} |\n", checkpoint.completed_articles));
        md.push_str(&format!("| Failed | {} |\n", checkpoint.failed_articles));
        md.push_str(&format!("| Success Rate | {} |\n\n", checkpoint.success_rate()));
    }

    md.push_str("## Tracked URLs\n\n");
    md.push_str("| State | Count |\n");
    md.push_str("|-------|-------|\n");
    md.push_str(&format!("| Completed | {} |\n", stats.completed));
    md.push_str(&format!("| Failed | {} |\n", stats.failed));
    md.push_str(&format!("| Pending | {} |\n\n", stats.pending));
    md.push_str(&format!(
        "- **Overall Success Rate**: {:.2}%\n\n",
        stats.success_rate()
    ));

    if !stats.failure_reasons.is_empty() {
        md.push_str("## Failure Reasons\n\n");
        md.push_str("| Reason | Count |\n");
        md.push_str("|--------|-------|\n");
        for (reason, count) in stats.failure_reasons.iter().take(MAX_FAILURE_ROWS) {
            md.push_str(&format!("| {} | {} |\n", escape_cell(reason), count));
        }
        if stats.failure_reasons.len() > MAX_FAILURE_ROWS {
            md.push_str(&format!(
                "\n... and {} more\n",
                stats.failure_reasons.len() - MAX_FAILURE_ROWS
            ));
        }
        md.push('\n');
    }

    md
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

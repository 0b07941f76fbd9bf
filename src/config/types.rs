use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Quill-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub output: OutputConfig,
    pub site: SiteConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum number of concurrent fetches within a batch
    #[serde(rename = "concurrent-requests")]
    pub concurrent_requests: usize,

    /// Number of URLs dispatched per batch
    #[serde(rename = "batch-size")]
    pub batch_size: usize,

    /// Stop once this many URLs are completed (across runs)
    #[serde(rename = "max-downloads")]
    pub max_downloads: u64,

    /// Base delay before each fetch (milliseconds), jittered ×[0.8, 1.2)
    #[serde(rename = "rate-limit")]
    pub rate_limit: u64,

    /// Retries after the first attempt
    #[serde(rename = "retry-count")]
    pub retry_count: u32,

    /// Delay before the first retry (milliseconds)
    #[serde(rename = "retry-delay")]
    pub retry_delay: u64,

    /// Growth factor applied to the retry delay after each failed attempt
    #[serde(rename = "backoff-multiplier")]
    pub backoff_multiplier: f64,

    /// Per-request timeout (milliseconds)
    #[serde(rename = "request-timeout")]
    pub request_timeout: u64,

    /// Lower bound of the pause between batches (milliseconds)
    #[serde(rename = "inter-batch-delay-min")]
    pub inter_batch_delay_min: u64,

    /// Upper bound of the pause between batches (milliseconds)
    #[serde(rename = "inter-batch-delay-max")]
    pub inter_batch_delay_max: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            concurrent_requests: 3,
            batch_size: 10,
            max_downloads: 100_000,
            rate_limit: 500,
            retry_count: 3,
            retry_delay: 1_000,
            backoff_multiplier: 2.0,
            request_timeout: 30_000,
            inter_batch_delay_min: 0,
            inter_batch_delay_max: 0,
        }
    }
}

impl CrawlerConfig {
    pub fn rate_limit_duration(&self) -> Duration {
        Duration::from_millis(self.rate_limit)
    }

    pub fn retry_delay_duration(&self) -> Duration {
        Duration::from_millis(self.retry_delay)
    }

    pub fn request_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.request_timeout)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving one markdown artifact per URL
    #[serde(rename = "download-dir")]
    pub download_dir: String,

    /// Completed log, one URL per line
    #[serde(rename = "track-file")]
    pub track_file: String,

    /// Failed log, `url<TAB>timestamp<TAB>reason`
    #[serde(rename = "failed-file")]
    pub failed_file: String,

    /// Candidate URL file seeding the frontier
    #[serde(rename = "urls-file")]
    pub urls_file: String,

    /// JSON checkpoint file
    #[serde(rename = "checkpoint-file")]
    pub checkpoint_file: String,

    /// Path to the markdown summary file
    #[serde(rename = "summary-path")]
    pub summary_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            download_dir: "articles".to_string(),
            track_file: "tracked.txt".to_string(),
            failed_file: "failed.tsv".to_string(),
            urls_file: "urls.txt".to_string(),
            checkpoint_file: "progress.json".to_string(),
            summary_path: "summary.md".to_string(),
        }
    }
}

impl OutputConfig {
    /// Moves every relative path under `dir`
    ///
    /// Used by the `--output-dir` flag. Absolute paths are left alone.
    pub fn rebase(&mut self, dir: &str) {
        let join = |p: &mut String| {
            let path = std::path::Path::new(p.as_str());
            if path.is_relative() {
                *p = std::path::Path::new(dir).join(path).to_string_lossy().into_owned();
            }
        };
        join(&mut self.download_dir);
        join(&mut self.track_file);
        join(&mut self.failed_file);
        join(&mut self.urls_file);
        join(&mut self.checkpoint_file);
        join(&mut self.summary_path);
    }
}

/// Crawl target description
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Short name used in logs and the summary
    pub name: String,

    /// Domain pattern (e.g., "example.com" or "*.example.com")
    pub domain: String,

    /// URLs written to an empty candidate file
    #[serde(default)]
    pub seeds: Vec<String>,

    /// Regex a canonical URL must match to be followed
    #[serde(rename = "url-pattern")]
    pub url_pattern: String,

    /// CSS selectors locating the article body, tried in order
    #[serde(rename = "content-selectors", default)]
    pub content_selectors: Vec<String>,

    /// CSS selectors whose presence marks an error page
    #[serde(rename = "error-selectors", default)]
    pub error_selectors: Vec<String>,

    /// Title substrings (case-insensitive) that mark an error page
    #[serde(rename = "error-phrases", default)]
    pub error_phrases: Vec<String>,

    /// Minimum extracted text length for a page to count as valid
    #[serde(rename = "min-content-length", default)]
    pub min_content_length: usize,
}

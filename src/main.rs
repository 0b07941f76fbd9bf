//! Quill-Harvest main entry point
//!
//! This is the command-line interface for the Quill-Harvest article crawler.

use anyhow::Context;
use clap::Parser;
use quill_harvest::config::{compute_config_hash, load_config_with_overrides, Config};
use quill_harvest::crawler::{run_crawl, HtmlAdapter, RunOptions};
use quill_harvest::output::{generate_markdown_summary, load_statistics, print_statistics};
use quill_harvest::url::canonicalize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::sync::watch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Quill-Harvest: a resumable article crawler
///
/// Quill-Harvest downloads the articles of one site into markdown files,
/// following links that match the configured pattern. Progress is durable:
/// an interrupted run picks up where it stopped without fetching completed
/// URLs again.
#[derive(Parser, Debug)]
#[command(name = "quill-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A resumable article crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Directory holding the output files (relative paths are joined to it)
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<String>,

    /// Stop once this many URLs have been completed, across runs
    #[arg(short = 'n', long)]
    max_downloads: Option<u64>,

    /// Concurrent requests
    #[arg(short, long)]
    workers: Option<usize>,

    /// URLs dispatched per batch
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Minimum pause between batches, in milliseconds
    #[arg(long, value_name = "MS")]
    min_delay: Option<u64>,

    /// Maximum pause between batches, in milliseconds
    #[arg(long, value_name = "MS")]
    max_delay: Option<u64>,

    /// Base delay before each fetch, in milliseconds
    #[arg(long, value_name = "MS")]
    rate_limit: Option<u64>,

    /// Retries after the first failed attempt
    #[arg(long)]
    retry_count: Option<u32>,

    /// Delay before the first retry, in milliseconds
    #[arg(long, value_name = "MS")]
    retry_delay: Option<u64>,

    /// Crawl from this URL instead of the configured seeds (repeatable)
    #[arg(long = "seed-url", value_name = "URL")]
    seed_urls: Vec<String>,

    /// Continue the previous run's checkpoint counters
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, forgetting tracked and candidate URLs
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Retry URLs recorded as failed
    #[arg(long)]
    reset_errors: bool,

    /// Copy the tracker logs to timestamped .bak files before the run
    #[arg(long)]
    backup: bool,

    /// Also write log lines to this file
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "export_summary"])]
    dry_run: bool,

    /// Show statistics of the crawl target and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_summary"])]
    stats: bool,

    /// Write the markdown summary from existing data and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    export_summary: bool,
}

impl Cli {
    /// Applies command-line values over the TOML ones
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(dir) = &self.output_dir {
            config.output.rebase(dir);
        }
        if let Some(n) = self.max_downloads {
            config.crawler.max_downloads = n;
        }
        if let Some(workers) = self.workers {
            config.crawler.concurrent_requests = workers;
        }
        if let Some(batch_size) = self.batch_size {
            config.crawler.batch_size = batch_size;
        }
        if let Some(min) = self.min_delay {
            config.crawler.inter_batch_delay_min = min;
        }
        if let Some(max) = self.max_delay {
            config.crawler.inter_batch_delay_max = max;
        }
        if let Some(rate_limit) = self.rate_limit {
            config.crawler.rate_limit = rate_limit;
        }
        if let Some(retry_count) = self.retry_count {
            config.crawler.retry_count = retry_count;
        }
        if let Some(retry_delay) = self.retry_delay {
            config.crawler.retry_delay = retry_delay;
        }
        if !self.seed_urls.is_empty() {
            config.site.seeds = self.seed_urls.clone();
        }
    }

    fn run_options(&self) -> RunOptions {
        RunOptions {
            fresh: self.fresh,
            resume: self.resume,
            reset_errors: self.reset_errors,
            backup: self.backup,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity; the guard flushes the log file on drop
    let _log_guard = match setup_logging(cli.verbose, cli.quiet, cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to open log file: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = load_config_with_overrides(&cli.config, |config| cli.apply_overrides(config))
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    let hash = compute_config_hash(&cli.config)?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        handle_dry_run(&config)?;
        Ok(ExitCode::SUCCESS)
    } else if cli.stats {
        handle_stats(&config)?;
        Ok(ExitCode::SUCCESS)
    } else if cli.export_summary {
        handle_export_summary(&config)?;
        Ok(ExitCode::SUCCESS)
    } else {
        handle_crawl(config, cli.run_options()).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// With `log_file`, every event that reaches the console is also appended
/// to that file without ANSI colors.
fn setup_logging(
    verbose: u8,
    quiet: bool,
    log_file: Option<&Path>,
) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("quill_harvest=info,warn"),
            1 => EnvFilter::new("quill_harvest=debug,info"),
            2 => EnvFilter::new("quill_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create log directory {}", dir.display()))?;
            let name = path
                .file_name()
                .with_context(|| format!("Log file path has no file name: {}", path.display()))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Quill-Harvest Dry Run ===\n");

    let crawler = &config.crawler;
    println!("Crawler Configuration:");
    println!("  Concurrent requests: {}", crawler.concurrent_requests);
    println!("  Batch size: {}", crawler.batch_size);
    println!("  Max downloads: {}", crawler.max_downloads);
    println!("  Rate limit: {}ms", crawler.rate_limit);
    println!(
        "  Retries: {} (base delay {}ms, multiplier {})",
        crawler.retry_count, crawler.retry_delay, crawler.backoff_multiplier
    );
    println!("  Request timeout: {}ms", crawler.request_timeout);
    println!(
        "  Pause between batches: {}..{}ms",
        crawler.inter_batch_delay_min, crawler.inter_batch_delay_max
    );

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Articles: {}", config.output.download_dir);
    println!("  Completed log: {}", config.output.track_file);
    println!("  Failed log: {}", config.output.failed_file);
    println!("  Candidates: {}", config.output.urls_file);
    println!("  Checkpoint: {}", config.output.checkpoint_file);
    println!("  Summary: {}", config.output.summary_path);

    let adapter = HtmlAdapter::from_config(&config.site)?;
    println!("\nSite: {} ({})", adapter.name(), config.site.domain);
    println!("  URL pattern: {}", config.site.url_pattern);
    println!("  Seeds ({}):", config.site.seeds.len());
    for seed in &config.site.seeds {
        let followed = canonicalize(seed)
            .map(|url| adapter.link_pattern().matches(&url))
            .unwrap_or(false);
        let note = if followed { "" } else { " (not matched by url-pattern)" };
        println!("    * {}{}", seed, note);
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start crawling with {} seed URLs",
        config.site.seeds.len()
    );

    Ok(())
}

/// Handles the --stats mode: shows statistics from the crawl files
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let stats = load_statistics(config).context("Failed to read crawl state")?;
    print_statistics(&stats);
    Ok(())
}

/// Handles the --export-summary mode: generates markdown summary
fn handle_export_summary(config: &Config) -> anyhow::Result<()> {
    println!("=== Exporting Crawl Summary ===\n");
    println!("Output: {}", config.output.summary_path);
    println!();

    tracing::info!("Loading crawl state...");
    let stats = load_statistics(config).context("Failed to read crawl state")?;

    tracing::info!("Generating markdown summary...");
    generate_markdown_summary(&stats, Path::new(&config.output.summary_path))?;

    println!("✓ Summary exported to: {}", config.output.summary_path);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, options: RunOptions) -> anyhow::Result<ExitCode> {
    if options.fresh {
        tracing::info!("Starting fresh crawl (ignoring previous state)");
    } else if options.resume {
        tracing::info!("Resuming crawl (continuing checkpoint counters)");
    } else {
        tracing::info!("Starting crawl (completed URLs are skipped)");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("Interrupt received, finishing the current batch (press Ctrl-C again to abort)");
        let _ = shutdown_tx.send(true);

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::error!("Second interrupt, aborting");
            std::process::exit(130);
        }
    });

    let outcome = run_crawl(config, options, shutdown_rx).await?;
    if let Some(error) = &outcome.report.error {
        tracing::error!("Crawl ended with error: {}", error);
    }

    Ok(ExitCode::from(outcome.status().exit_code()))
}

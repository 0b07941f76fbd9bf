//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end, including reruns over the same files.

use quill_harvest::config::{
    load_config_with_overrides, Config, CrawlerConfig, OutputConfig, SiteConfig, UserAgentConfig,
};
use quill_harvest::crawler::{Coordinator, CrawlOutcome, RunOptions};
use quill_harvest::output::CheckpointRecorder;
use quill_harvest::storage::{Artifact, ArtifactSink, CandidateFile, FsArtifactSink, UrlTracker};
use quill_harvest::url::canonicalize;
use quill_harvest::RunStatus;
use std::path::Path;
use tempfile::TempDir;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration crawling the mock server into `dir`
fn create_test_config(base_url: &str, dir: &TempDir) -> Config {
    let mut output = OutputConfig::default();
    output.rebase(dir.path().to_str().unwrap());

    Config {
        crawler: CrawlerConfig {
            concurrent_requests: 3,
            batch_size: 2,
            rate_limit: 0,
            retry_count: 1,
            retry_delay: 10,
            request_timeout: 5000,
            ..CrawlerConfig::default()
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        output,
        site: SiteConfig {
            name: "mock".to_string(),
            domain: "127.0.0.1".to_string(),
            seeds: vec![format!("{}/node/1", base_url)],
            url_pattern: r"^http://127\.0\.0\.1:\d+/node/\d+$".to_string(),
            content_selectors: vec!["article".to_string()],
            error_selectors: vec![".page-not-found".to_string()],
            error_phrases: vec!["not found".to_string()],
            min_content_length: 5,
        },
    }
}

fn article(title: &str, links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!("<a href=\"{}\">link</a>", href))
        .collect();
    format!(
        "<html><head><title>{title}</title></head><body><h1>{title}</h1>\
         <article><p>Body text of {title}.</p></article>{anchors}</body></html>"
    )
}

async fn mount_page(server: &MockServer, route: &str, html: String, expected: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(html)
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .expect(expected)
        .mount(server)
        .await;
}

async fn run(config: Config, options: RunOptions) -> CrawlOutcome {
    let (_tx, rx) = watch::channel(false);
    Coordinator::new(config, options)
        .expect("Failed to create coordinator")
        .run(rx)
        .await
        .expect("Crawl failed")
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.map(|r| r.len()).unwrap_or(0)
}

fn artifact_count(config: &Config) -> usize {
    std::fs::read_dir(&config.output.download_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map(|x| x == "md").unwrap_or(false))
        .count()
}

#[tokio::test]
async fn test_full_crawl_follows_links() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &dir);

    mount_page(
        &server,
        "/node/1",
        article("First", &["/node/2", "/node/3", "/about", "mailto:x@example.com"]),
        1,
    )
    .await;
    mount_page(&server, "/node/2", article("Second", &["/node/1", "/node/4"]), 1).await;
    mount_page(&server, "/node/3", article("Third", &[]), 1).await;
    mount_page(&server, "/node/4", article("Fourth", &["/node/2"]), 1).await;

    let outcome = run(config.clone(), RunOptions::default()).await;

    assert_eq!(outcome.status(), RunStatus::Completed);
    assert_eq!(outcome.report.succeeded, 4);
    assert_eq!(outcome.report.failed, 0);
    assert_eq!(artifact_count(&config), 4);

    let candidates = CandidateFile::new(&config.output.urls_file).load().unwrap();
    assert_eq!(candidates.len(), 4);

    let tracked = std::fs::read_to_string(&config.output.track_file).unwrap();
    assert_eq!(tracked.lines().count(), 4);

    let checkpoint = CheckpointRecorder::load(Path::new(&config.output.checkpoint_file)).unwrap();
    assert_eq!(checkpoint.status, RunStatus::Completed);
    assert_eq!(checkpoint.completed_articles, 4);
    assert_eq!(checkpoint.statistics.unwrap().success_rate, "100.00%");

    let summary = std::fs::read_to_string(&config.output.summary_path).unwrap();
    assert!(summary.contains("# Crawl Summary: mock"));
}

#[tokio::test]
async fn test_failures_are_retried_then_recorded() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &dir);

    mount_page(&server, "/node/1", article("First", &["/node/2", "/node/3"]), 1).await;
    mount_page(
        &server,
        "/node/2",
        "<html><body><div class=\"page-not-found\">gone</div></body></html>".to_string(),
        2,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/node/3"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let outcome = run(config.clone(), RunOptions::default()).await;

    assert_eq!(outcome.status(), RunStatus::Completed);
    assert_eq!(outcome.report.succeeded, 1);
    assert_eq!(outcome.report.failed, 2);
    assert_eq!(artifact_count(&config), 1);

    let failed = std::fs::read_to_string(&config.output.failed_file).unwrap();
    let lines: Vec<&str> = failed.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().all(|line| line.split('\t').count() == 3));
    assert!(failed.contains("HTTP 500"));
    assert!(failed.contains("page-not-found"));

    let summary = std::fs::read_to_string(&config.output.summary_path).unwrap();
    assert!(summary.contains("## Failure Reasons"));
}

#[tokio::test]
async fn test_rerun_fetches_nothing() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &dir);

    mount_page(&server, "/node/1", article("First", &["/node/2"]), 1).await;
    mount_page(&server, "/node/2", article("Second", &[]), 1).await;

    run(config.clone(), RunOptions::default()).await;
    let after_first = request_count(&server).await;
    assert_eq!(after_first, 2);

    let outcome = run(config.clone(), RunOptions::default()).await;

    assert_eq!(outcome.status(), RunStatus::Completed);
    assert_eq!(outcome.report.batches, 0);
    assert_eq!(request_count(&server).await, after_first);
}

#[tokio::test]
async fn test_resume_after_crash() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &dir);
    let base = server.uri();
    let url = |n: u32| canonicalize(&format!("{}/node/{}", base, n)).unwrap();

    // State left by a crash: node 1 tracked, node 2 written but not tracked,
    // and a torn line at the end of the completed log
    std::fs::write(
        &config.output.urls_file,
        format!("{}\n{}\n{}\n", url(1), url(2), url(3)),
    )
    .unwrap();
    std::fs::write(
        &config.output.track_file,
        format!("{}\n{}/no", url(1), base),
    )
    .unwrap();
    FsArtifactSink::new(&config.output.download_dir)
        .unwrap()
        .persist(
            &url(2),
            &Artifact {
                title: Some("Second".to_string()),
                article_id: "2".to_string(),
                body: "Saved before the crash.".to_string(),
            },
        )
        .unwrap();

    mount_page(&server, "/node/1", article("First", &[]), 0).await;
    mount_page(&server, "/node/2", article("Second", &[]), 0).await;
    mount_page(&server, "/node/3", article("Third", &[]), 1).await;

    let outcome = run(config.clone(), RunOptions::default()).await;

    assert_eq!(outcome.status(), RunStatus::Completed);
    assert_eq!(outcome.report.succeeded, 2);
    assert_eq!(outcome.report.recovered, 1);

    let tracker = UrlTracker::load(
        Path::new(&config.output.track_file),
        Path::new(&config.output.failed_file),
    )
    .unwrap();
    assert_eq!(tracker.completed_count(), 3);
    assert!((1..=3).all(|n| tracker.is_completed(&url(n))));
}

#[tokio::test]
async fn test_cap_holds_across_runs() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), &dir);
    config.crawler.max_downloads = 2;

    mount_page(&server, "/node/1", article("First", &["/node/2", "/node/3"]), 1).await;
    mount_page(&server, "/node/2", article("Second", &[]), 1).await;
    mount_page(&server, "/node/3", article("Third", &[]), 1).await;

    let first = run(config.clone(), RunOptions::default()).await;
    assert_eq!(first.status(), RunStatus::Completed);
    assert_eq!(first.report.succeeded, 2);

    // Same cap: already reached, nothing dispatched
    let capped = run(config.clone(), RunOptions::default()).await;
    assert_eq!(capped.report.batches, 0);
    assert_eq!(request_count(&server).await, 2);

    config.crawler.max_downloads = 10;
    let rest = run(config, RunOptions::default()).await;
    assert_eq!(rest.report.succeeded, 1);
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn test_interrupted_run_resumes() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), &dir);

    mount_page(&server, "/node/1", article("First", &["/node/2"]), 1).await;
    mount_page(&server, "/node/2", article("Second", &[]), 1).await;

    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();
    let interrupted = Coordinator::new(config.clone(), RunOptions::default())
        .unwrap()
        .run(rx)
        .await
        .unwrap();

    assert_eq!(interrupted.status(), RunStatus::Interrupted);
    assert_eq!(interrupted.status().exit_code(), 130);
    let checkpoint = CheckpointRecorder::load(Path::new(&config.output.checkpoint_file)).unwrap();
    assert_eq!(checkpoint.status, RunStatus::Interrupted);

    let options = RunOptions {
        resume: true,
        ..RunOptions::default()
    };
    let resumed = run(config, options).await;
    assert_eq!(resumed.status(), RunStatus::Completed);
    assert_eq!(resumed.checkpoint.started_at, checkpoint.started_at);
    assert_eq!(resumed.checkpoint.completed_articles, 2);
}

#[tokio::test]
async fn test_config_file_with_overrides() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_page(&server, "/node/1", article("First", &[]), 1).await;

    let config_path = dir.path().join("site.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
[crawler]
rate-limit = 0
retry-count = 0

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[site]
name = "mock"
domain = "127.0.0.1"
seeds = ["{}/node/1"]
url-pattern = '^http://127\.0\.0\.1:\d+/node/\d+$'
content-selectors = ["article"]
"#,
            server.uri()
        ),
    )
    .unwrap();

    let out = dir.path().join("out");
    let config = load_config_with_overrides(&config_path, |config| {
        config.output.rebase(out.to_str().unwrap());
        config.crawler.concurrent_requests = 1;
    })
    .unwrap();
    assert_eq!(config.crawler.concurrent_requests, 1);

    let outcome = run(config, RunOptions::default()).await;

    assert_eq!(outcome.status(), RunStatus::Completed);
    assert!(out.join("tracked.txt").exists());
    assert!(out.join("summary.md").exists());
}

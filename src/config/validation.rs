use crate::config::types::{Config, CrawlerConfig, OutputConfig, SiteConfig, UserAgentConfig};
use crate::url::{matches_wildcard, LinkPattern};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_site_config(&config.site)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrent_requests < 1 || config.concurrent_requests > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrent_requests must be between 1 and 100, got {}",
            config.concurrent_requests
        )));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "batch_size must be >= 1, got {}",
            config.batch_size
        )));
    }

    if config.max_downloads < 1 {
        return Err(ConfigError::Validation(format!(
            "max_downloads must be >= 1, got {}",
            config.max_downloads
        )));
    }

    if !config.backoff_multiplier.is_finite() || config.backoff_multiplier < 1.0 {
        return Err(ConfigError::Validation(format!(
            "backoff_multiplier must be >= 1.0, got {}",
            config.backoff_multiplier
        )));
    }

    if config.request_timeout < 1_000 || config.request_timeout > 300_000 {
        return Err(ConfigError::Validation(format!(
            "request_timeout must be between 1000ms and 300000ms, got {}ms",
            config.request_timeout
        )));
    }

    if config.inter_batch_delay_min > config.inter_batch_delay_max {
        return Err(ConfigError::Validation(format!(
            "inter_batch_delay_min ({}ms) exceeds inter_batch_delay_max ({}ms)",
            config.inter_batch_delay_min, config.inter_batch_delay_max
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    let paths = [
        ("download_dir", &config.download_dir),
        ("track_file", &config.track_file),
        ("failed_file", &config.failed_file),
        ("urls_file", &config.urls_file),
        ("checkpoint_file", &config.checkpoint_file),
        ("summary_path", &config.summary_path),
    ];

    for (name, value) in paths {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    if config.track_file == config.failed_file {
        return Err(ConfigError::Validation(
            "track_file and failed_file must be different files".to_string(),
        ));
    }

    Ok(())
}

/// Validates the crawl target
fn validate_site_config(site: &SiteConfig) -> Result<(), ConfigError> {
    if site.name.trim().is_empty() {
        return Err(ConfigError::Validation("site name cannot be empty".to_string()));
    }

    validate_domain_pattern(&site.domain)?;

    // Compiles the regex; a bad pattern surfaces as InvalidPattern
    LinkPattern::new(&site.domain, &site.url_pattern)?;

    for seed in &site.seeds {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' must use http or https",
                seed
            )));
        }

        let host = url.host_str().unwrap_or_default().to_lowercase();
        if !matches_wildcard(&site.domain.to_lowercase(), &host) {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' is outside domain '{}'",
                seed, site.domain
            )));
        }
    }

    for selector in site.content_selectors.iter().chain(&site.error_selectors) {
        Selector::parse(selector).map_err(|e| {
            ConfigError::InvalidPattern(format!("Invalid CSS selector '{}': {:?}", selector, e))
        })?;
    }

    Ok(())
}

/// Validates a domain pattern (supports wildcards)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    if let Some(domain) = pattern.strip_prefix("*.") {
        validate_domain_string(domain)?;
    } else {
        validate_domain_string(pattern)?;
    }

    Ok(())
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with(['.', '-']) || domain.ends_with(['.', '-']) {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    // localhost is allowed for local mirrors
    if !domain.contains('.') && domain != "localhost" {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.com')",
            domain
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

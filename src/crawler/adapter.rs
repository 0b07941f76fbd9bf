//! Site adapters
//!
//! An adapter knows what a good page looks like for one site: how to tell a
//! real article from an error page, where the article body lives and which
//! links lead to more articles. The engine itself is site-agnostic.

use crate::config::SiteConfig;
use crate::crawler::fetcher::RawPage;
use crate::crawler::parser::{extract_body, extract_links, extract_title, find_container};
use crate::storage::Artifact;
use crate::url::{CanonicalUrl, LinkPattern};
use crate::ConfigError;
use scraper::{Html, Selector};
use thiserror::Error;
use url::Url;

/// Artifact and discovered links produced from one page
#[derive(Debug, Clone)]
pub struct Extraction {
    pub artifact: Artifact,

    /// Canonical links that passed the site's link predicate
    pub links: Vec<CanonicalUrl>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("no content container matched")]
    NoContent,

    #[error("extracted body is empty")]
    EmptyBody,

    #[error("page URL cannot be used as a base: {0}")]
    BaseUrl(String),
}

/// Site-specific validation and extraction
pub trait SiteAdapter: Send + Sync {
    /// Returns true if the page holds real content
    fn is_valid(&self, page: &RawPage) -> bool;

    /// Produces the artifact and candidate links for a valid page
    fn extract(&self, page: &RawPage) -> Result<Extraction, AdapterError>;

    /// Explains why a page was rejected, or None if it is valid
    fn rejection(&self, page: &RawPage) -> Option<String> {
        if self.is_valid(page) {
            None
        } else {
            Some("content failed validation".to_string())
        }
    }
}

/// Selector-driven adapter configured from the `[site]` table
pub struct HtmlAdapter {
    name: String,
    links: LinkPattern,
    content_selectors: Vec<Selector>,
    error_selectors: Vec<(String, Selector)>,
    error_phrases: Vec<String>,
    min_content_length: usize,
}

impl HtmlAdapter {
    pub fn from_config(site: &SiteConfig) -> Result<Self, ConfigError> {
        let parse = |raw: &str| {
            Selector::parse(raw).map_err(|e| {
                ConfigError::InvalidPattern(format!("Invalid CSS selector '{}': {:?}", raw, e))
            })
        };

        let content_selectors = site
            .content_selectors
            .iter()
            .map(|s| parse(s))
            .collect::<Result<Vec<_>, _>>()?;
        let error_selectors = site
            .error_selectors
            .iter()
            .map(|s| parse(s).map(|sel| (s.clone(), sel)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: site.name.clone(),
            links: LinkPattern::new(&site.domain, &site.url_pattern)?,
            content_selectors,
            error_selectors,
            error_phrases: site
                .error_phrases
                .iter()
                .map(|p| p.to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
            min_content_length: site.min_content_length,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn link_pattern(&self) -> &LinkPattern {
        &self.links
    }

    /// Body text of the content container, or of `<body>` when no
    /// container selectors are configured
    fn body_text(&self, document: &Html) -> Option<String> {
        if self.content_selectors.is_empty() {
            let body = Selector::parse("body").ok()?;
            return document.select(&body).next().map(extract_body);
        }
        find_container(document, &self.content_selectors).map(extract_body)
    }

    fn check(&self, page: &RawPage) -> Result<(), String> {
        if page.body.trim().is_empty() {
            return Err("empty response body".to_string());
        }

        let document = Html::parse_document(&page.body);

        for (raw, selector) in &self.error_selectors {
            if document.select(selector).next().is_some() {
                return Err(format!("error page marker '{}' present", raw));
            }
        }

        if let Some(title) = extract_title(&document) {
            let lowered = title.to_lowercase();
            if let Some(phrase) = self.error_phrases.iter().find(|p| lowered.contains(p.as_str())) {
                return Err(format!("title contains error phrase '{}'", phrase));
            }
        }

        let Some(text) = self.body_text(&document) else {
            return Err("no content container matched".to_string());
        };

        let length = text.chars().count();
        if length == 0 || length < self.min_content_length {
            return Err(format!(
                "content too short ({} < {} chars)",
                length,
                self.min_content_length.max(1)
            ));
        }

        Ok(())
    }
}

impl SiteAdapter for HtmlAdapter {
    fn is_valid(&self, page: &RawPage) -> bool {
        self.check(page).is_ok()
    }

    fn rejection(&self, page: &RawPage) -> Option<String> {
        self.check(page).err()
    }

    fn extract(&self, page: &RawPage) -> Result<Extraction, AdapterError> {
        let base = Url::parse(&page.final_url)
            .ok()
            .or_else(|| page.url.to_url())
            .ok_or_else(|| AdapterError::BaseUrl(page.final_url.clone()))?;

        let document = Html::parse_document(&page.body);
        let body = self.body_text(&document).ok_or(AdapterError::NoContent)?;
        if body.trim().is_empty() {
            return Err(AdapterError::EmptyBody);
        }

        let links: Vec<CanonicalUrl> = extract_links(&document, &base)
            .into_iter()
            .filter(|link| self.links.matches(link))
            .collect();

        Ok(Extraction {
            artifact: Artifact {
                title: extract_title(&document),
                article_id: page.url.article_id(),
                body,
            },
            links,
        })
    }
}

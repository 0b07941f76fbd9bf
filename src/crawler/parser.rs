//! HTML parsing helpers shared by site adapters
//!
//! This module handles pulling three things out of a parsed document:
//! - The article title (`<h1>`, falling back to `<title>`)
//! - The article body under a content container
//! - Links to follow, resolved and canonicalized

use crate::url::{canonicalize, CanonicalUrl};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Elements whose text makes up an article body
const BODY_ELEMENTS: &str = "p, h2, h3";

/// Extracts the article title
///
/// The first non-empty `<h1>` wins; otherwise the `<title>` tag is used.
pub fn extract_title(document: &Html) -> Option<String> {
    ["h1", "title"].iter().find_map(|tag| {
        let selector = Selector::parse(tag).ok()?;
        document
            .select(&selector)
            .map(|element| normalize_whitespace(&element.text().collect::<String>()))
            .find(|s| !s.is_empty())
    })
}

/// Returns the first element matching any selector, tried in order
pub fn find_container<'a>(document: &'a Html, selectors: &[Selector]) -> Option<ElementRef<'a>> {
    selectors
        .iter()
        .find_map(|selector| document.select(selector).next())
}

/// Assembles body text from paragraphs and headings inside `container`
///
/// Headings are rendered as `## heading`; blocks are separated by a blank
/// line. A container without such elements contributes its full text.
pub fn extract_body(container: ElementRef<'_>) -> String {
    let Ok(block_selector) = Selector::parse(BODY_ELEMENTS) else {
        return normalize_whitespace(&container.text().collect::<String>());
    };

    let mut blocks = Vec::new();
    for element in container.select(&block_selector) {
        let text = normalize_whitespace(&element.text().collect::<String>());
        if text.is_empty() {
            continue;
        }
        match element.value().name() {
            "h2" | "h3" => blocks.push(format!("## {}", text)),
            _ => blocks.push(text),
        }
    }

    if blocks.is_empty() {
        return normalize_whitespace(&container.text().collect::<String>());
    }
    blocks.join("\n\n")
}

/// Extracts all followable links from the document
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags anywhere in the document
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs and fragment-only links
/// - Anything that is not http(s) after resolution
///
/// Links come back canonicalized and deduplicated, in document order.
pub fn extract_links(document: &Html, base_url: &Url) -> Vec<CanonicalUrl> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    let mut push = |href: &str| {
        if let Some(url) = resolve_link(href, base_url) {
            if seen.insert(url.clone()) {
                links.push(url);
            }
        }
    };

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(href) = element.value().attr("href") {
                push(href);
            }
        }
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(href) = element.value().attr("href") {
                push(href);
            }
        }
    }

    links
}

/// Resolves a link href against the page URL and canonicalizes it
///
/// Returns None if the link should be excluded.
fn resolve_link(href: &str, base_url: &Url) -> Option<CanonicalUrl> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    canonicalize(absolute.as_str()).ok()
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    fn links(html: &str) -> Vec<String> {
        extract_links(&Html::parse_document(html), &base_url())
            .into_iter()
            .map(|u| u.as_str().to_string())
            .collect()
    }

    #[test]
    fn test_title_prefers_h1() {
        let html = r#"<html><head><title>Site | Page</title></head><body><h1> Headline </h1></body></html>"#;
        assert_eq!(
            extract_title(&Html::parse_document(html)),
            Some("Headline".to_string())
        );
    }

    #[test]
    fn test_title_falls_back_to_title_tag() {
        let html = r#"<html><head><title>  Test Page  </title></head><body><h1>  </h1></body></html>"#;
        assert_eq!(
            extract_title(&Html::parse_document(html)),
            Some("Test Page".to_string())
        );
    }

    #[test]
    fn test_no_title() {
        let html = r#"<html><head></head><body></body></html>"#;
        assert_eq!(extract_title(&Html::parse_document(html)), None);
    }

    #[test]
    fn test_body_from_first_matching_container() {
        let html = r#"
            <html><body>
                <div class="sidebar"><p>ignore me</p></div>
                <article>
                    <p>First   paragraph.</p>
                    <h2>Section</h2>
                    <p>Second paragraph.</p>
                    <p>  </p>
                </article>
            </body></html>
        "#;
        let document = Html::parse_document(html);
        let selectors = vec![
            Selector::parse(".missing").unwrap(),
            Selector::parse("article").unwrap(),
        ];
        let container = find_container(&document, &selectors).unwrap();
        assert_eq!(
            extract_body(container),
            "First paragraph.\n\n## Section\n\nSecond paragraph."
        );
    }

    #[test]
    fn test_body_without_blocks_uses_text() {
        let html = r#"<html><body><div class="c">just <b>text</b></div></body></html>"#;
        let document = Html::parse_document(html);
        let selectors = vec![Selector::parse(".c").unwrap()];
        let container = find_container(&document, &selectors).unwrap();
        assert_eq!(extract_body(container), "just text");
    }

    #[test]
    fn test_extract_absolute_link() {
        let found = links(r#"<a href="https://other.com/page">Link</a>"#);
        assert_eq!(found, vec!["https://other.com/page"]);
    }

    #[test]
    fn test_extract_relative_links() {
        let found = links(r#"<a href="/other">a</a><a href="sibling">b</a>"#);
        assert_eq!(
            found,
            vec!["https://example.com/other", "https://example.com/sibling"]
        );
    }

    #[test]
    fn test_links_are_canonicalized_and_deduped() {
        let found = links(
            r#"<a href="/node/1/">a</a><a href="/node/1#comments">b</a><a href="HTTPS://EXAMPLE.com/node/1?">c</a>"#,
        );
        assert_eq!(found, vec!["https://example.com/node/1"]);
    }

    #[test]
    fn test_skip_special_schemes() {
        let found = links(
            r#"
            <a href="javascript:void(0)">js</a>
            <a href="JavaScript:alert(1)">js</a>
            <a href="mailto:test@example.com">mail</a>
            <a href="tel:+1234567890">tel</a>
            <a href="data:text/html,<h1>Test</h1>">data</a>
            <a href="ftp://example.com/file">ftp</a>
            "#,
        );
        assert!(found.is_empty());
    }

    #[test]
    fn test_skip_download_and_fragment_links() {
        let found = links(r##"<a href="/file.pdf" download>d</a><a href="#section">j</a>"##);
        assert!(found.is_empty());
    }

    #[test]
    fn test_follow_nofollow_links() {
        let found = links(r#"<a href="/page2" rel="nofollow">Link</a>"#);
        assert_eq!(found, vec!["https://example.com/page2"]);
    }

    #[test]
    fn test_extract_canonical_link() {
        let found = links(
            r#"<html><head><link rel="canonical" href="https://example.com/canonical" /></head><body></body></html>"#,
        );
        assert_eq!(found, vec!["https://example.com/canonical"]);
    }
}

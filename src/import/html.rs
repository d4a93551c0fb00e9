// src/import/html.rs
// =============================================================================
// This module extracts links from HTML pages (bookmark exports, link lists).
//
// We use the `scraper` crate to parse the document and select every
// <a href> element, and the `url` crate to resolve relative hrefs against an
// optional base URL. Without a base, relative links are dropped: a stored
// link has to be absolute.
// =============================================================================

use super::is_importable;
use scraper::{Html, Selector};
use tracing::warn;
use url::Url;

/// Extracts every absolute http(s) link from an HTML document.
///
/// Example:
///   html = "<a href='/docs'>Docs</a>"
///   base_url = Some("https://example.com")
///   result = ["https://example.com/docs"]
pub fn extract_html_links(html: &str, base_url: Option<&str>) -> Vec<String> {
    let document = Html::parse_document(html);

    // Constant selector, known to be valid
    let selector = match Selector::parse("a[href]") {
        Ok(selector) => selector,
        Err(_) => return Vec::new(),
    };

    let base = match base_url.map(Url::parse) {
        Some(Ok(url)) => Some(url),
        Some(Err(e)) => {
            warn!("Ignoring invalid base URL {:?}: {}", base_url, e);
            None
        }
        None => None,
    };

    document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| resolve_url(base.as_ref(), href))
        .filter(|url| is_importable(url))
        .collect()
}

// Resolves a possibly-relative href to an absolute URL
//
// Examples (base = "https://example.com/page"):
//   "/docs"               -> Some("https://example.com/docs")
//   "https://other.com"   -> Some("https://other.com/")
//   "javascript:void(0)"  -> Some(..), filtered out later as non-http
//   "/docs" without base  -> None
fn resolve_url(base: Option<&Url>, href: &str) -> Option<String> {
    match Url::parse(href) {
        Ok(url) => Some(url.to_string()),
        Err(_) => base.and_then(|base| base.join(href).ok()).map(|url| url.to_string()),
    }
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why is the selector parsed inside the function?
//    - Selector::parse returns a Result, even for a constant string
//    - Matching on it keeps the function free of unwrap()
//
// 2. What does Url::join do?
//    - Resolves a relative reference the way a browser does
//    - "https://example.com/a/b" joined with "../c" -> "https://example.com/c"
//    - An href that is already absolute parses on its own and skips the join
//
// 3. Why Option<&Url> for the base?
//    - Import without --base-url is allowed; relative links just disappear
//    - as_ref() turns &Option<Url> into Option<&Url> without moving it
// -----------------------------------------------------------------------------

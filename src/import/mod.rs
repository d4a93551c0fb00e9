// src/import/mod.rs
// =============================================================================
// This module seeds the link store from documents.
//
// Submodules:
// - markdown: Extracts links from Markdown text
// - html: Extracts links from HTML pages
//
// Imported links start out as `unknown` with no check timestamp, which makes
// them the first thing the next batch picks up.
// =============================================================================

mod html;
mod markdown;

pub use html::extract_html_links;
pub use markdown::extract_markdown_links;

use crate::store::{LinkStore, StoreError};
use clap::ValueEnum;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// Kind of document being imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DocumentFormat {
    Markdown,
    Html,
}

impl DocumentFormat {
    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "md" | "markdown" => Some(DocumentFormat::Markdown),
            "html" | "htm" => Some(DocumentFormat::Html),
            _ => None,
        }
    }
}

/// What an import did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Links found in the document
    pub found: usize,
    /// Links newly added to the store
    pub added: usize,
    /// Links the store already had
    pub duplicates: usize,
}

pub fn extract_links(document: &str, format: DocumentFormat, base_url: Option<&str>) -> Vec<String> {
    match format {
        DocumentFormat::Markdown => extract_markdown_links(document),
        DocumentFormat::Html => extract_html_links(document, base_url),
    }
}

/// Insert each URL as a new, never-checked link.
pub fn import_links(store: &dyn LinkStore, urls: &[String]) -> Result<ImportSummary, StoreError> {
    let mut summary = ImportSummary {
        found: urls.len(),
        ..Default::default()
    };
    for url in urls {
        match store.insert_link(url)? {
            Some(id) => {
                debug!(link_id = id, url = %url, "Imported link");
                summary.added += 1;
            }
            None => summary.duplicates += 1,
        }
    }
    Ok(summary)
}

// Only absolute http(s) links can be probed.
// Skips mailto:, tel:, javascript:, data:, file: and relative links.
fn is_importable(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

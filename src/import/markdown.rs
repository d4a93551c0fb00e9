// src/import/markdown.rs
// =============================================================================
// This module extracts links from Markdown text.
//
// We use the `pulldown-cmark` crate which:
// - Parses Markdown into events (heading, paragraph, link, etc.)
// - Follows the CommonMark specification
// - Is a streaming parser, so large link lists are cheap to read
//
// Both inline links `[text](url)` and autolinks `<url>` come out as
// Tag::Link events, so one match arm covers them.
// =============================================================================

use super::is_importable;
use pulldown_cmark::{Event, Parser, Tag};

/// Extracts every absolute http(s) link from Markdown text, in document order.
///
/// Example input:
///   "Check out [Tor Project](http://2gzyxa5ihm7nsggfxnu52rck2vv4rvmdlkiu3zzui5du4xyclen53wid.onion)!"
///
/// Example output:
///   vec!["http://2gzyxa5ihm7nsggfxnu52rck2vv4rvmdlkiu3zzui5du4xyclen53wid.onion"]
pub fn extract_markdown_links(markdown: &str) -> Vec<String> {
    // Parser is an iterator of events over the whole document
    Parser::new(markdown)
        .filter_map(|event| match event {
            // In pulldown-cmark 0.9, Link is Tag::Link(link_type, dest_url, title)
            Event::Start(Tag::Link(_link_type, dest_url, _title)) => {
                // dest_url is a CowStr borrowed from the input; copy it out
                let url = dest_url.to_string();
                // mailto:, relative paths, anchors... are dropped here
                is_importable(&url).then_some(url)
            }
            // Text, headings, the matching End(Link) event, etc.
            _ => None,
        })
        .collect()
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why filter_map instead of a loop with a "current link" variable?
//    - We only need the destination, which is already on the Start(Link) event
//    - The link text comes later as Text events, but nothing here stores it
//    - filter_map = map + drop the None results, in one pass
//
// 2. What is bool::then_some?
//    - cond.then_some(value) is Some(value) if cond is true, else None
//    - Handy at the end of a filter_map closure
//
// 3. Why are duplicates kept?
//    - The store decides what is a duplicate (UNIQUE url column)
//    - import_links counts them so the summary can report "already stored"
// -----------------------------------------------------------------------------

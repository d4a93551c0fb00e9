// src/store/mod.rs
// =============================================================================
// This module is the link store: the persistent home of every link record.
//
// The checker never talks to SQLite directly. It goes through the `LinkStore`
// trait, which is the whole contract it needs:
// - fetch a bounded, ordered batch of links that are due for a check
// - read / write the per-link check state (status, failure counter, ...)
// - delete a link once it has failed too many times in a row
//
// Submodules:
// - models: the record types shared between the store and the checker
// - sqlite: the SQLite implementation used by the binary and the tests
// =============================================================================

mod models;
mod sqlite;

pub use models::{DueLink, LinkId, LinkRecord, LinkStats, LinkStatus, StatusUpdate};
pub use sqlite::SqliteLinkStore;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by a [`LinkStore`].
///
/// Missing ids are always an error: a write or delete that touches no row
/// must not pass silently.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Link not found: {id}")]
    NotFound { id: LinkId },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Storage contract consumed by the link checker.
pub trait LinkStore: Send + Sync {
    /// Links whose `last_checked_at` is NULL or older than `due_before`,
    /// never-checked first, then oldest-checked first, at most `limit` rows.
    fn fetch_due_links(
        &self,
        limit: usize,
        due_before: DateTime<Utc>,
    ) -> Result<Vec<DueLink>, StoreError>;

    /// Current consecutive failure counter of a link.
    fn read_failure_count(&self, id: LinkId) -> Result<u32, StoreError>;

    /// Persist the outcome of one check.
    fn write_link_status(&self, id: LinkId, update: &StatusUpdate) -> Result<(), StoreError>;

    /// Remove a link and everything hanging off it (votes, comments).
    fn delete_link(&self, id: LinkId) -> Result<(), StoreError>;

    /// Add a new, never-checked link. Returns `None` if the URL is already stored.
    fn insert_link(&self, url: &str) -> Result<Option<LinkId>, StoreError>;

    fn get_link(&self, id: LinkId) -> Result<LinkRecord, StoreError>;

    /// All links, ordered by id.
    fn list_links(&self) -> Result<Vec<LinkRecord>, StoreError>;

    /// Counts by status plus the number of links due as of `due_before`.
    fn link_stats(&self, due_before: DateTime<Utc>) -> Result<LinkStats, StoreError>;
}

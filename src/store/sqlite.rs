// src/store/sqlite.rs
// =============================================================================
// SQLite implementation of the LinkStore trait.
//
// Timestamps are stored as INTEGER milliseconds since the Unix epoch, so the
// due-link query is a plain numeric comparison and NULL means "never checked".
//
// Votes and comments reference links with ON DELETE CASCADE: deleting a dead
// link takes its dependent rows with it, the checker does not need to know
// they exist.
// =============================================================================

use super::models::{DueLink, LinkId, LinkRecord, LinkStats, LinkStatus, StatusUpdate};
use super::{LinkStore, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS links (
    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
    url                  TEXT NOT NULL UNIQUE,
    status               TEXT NOT NULL DEFAULT 'unknown',
    status_code          INTEGER,
    error_message        TEXT,
    last_checked_at      INTEGER,
    last_verified_at     INTEGER,
    consecutive_failures INTEGER NOT NULL DEFAULT 0,
    created_at           INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_links_last_checked_at ON links(last_checked_at);

CREATE TABLE IF NOT EXISTS link_votes (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    link_id    INTEGER NOT NULL REFERENCES links(id) ON DELETE CASCADE,
    value      INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS link_comments (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    link_id    INTEGER NOT NULL REFERENCES links(id) ON DELETE CASCADE,
    body       TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
";

const RECORD_COLUMNS: &str = "id, url, status, status_code, error_message, \
     last_checked_at, last_verified_at, consecutive_failures";

/// SQLite-backed link store.
///
/// One connection behind a mutex; every call is a short point query, so the
/// async callers never hold the lock across an await.
pub struct SqliteLinkStore {
    conn: Mutex<Connection>,
}

impl SqliteLinkStore {
    /// Open (and create if needed) the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        info!("Opened link store at {:?}", path.as_ref());
        Self::with_connection(conn)
    }

    /// A private in-memory database, used by tests and dry runs.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl LinkStore for SqliteLinkStore {
    fn fetch_due_links(
        &self,
        limit: usize,
        due_before: DateTime<Utc>,
    ) -> Result<Vec<DueLink>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, url, last_checked_at FROM links
             WHERE last_checked_at IS NULL OR last_checked_at < ?1
             ORDER BY last_checked_at ASC NULLS FIRST, id ASC
             LIMIT ?2",
        )?;
        let links = stmt
            .query_map(
                params![due_before.timestamp_millis(), limit as i64],
                |row| {
                    Ok(DueLink {
                        id: row.get(0)?,
                        url: row.get(1)?,
                        last_checked_at: row.get::<_, Option<i64>>(2)?.map(from_millis),
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        debug!("Fetched {} due link(s)", links.len());
        Ok(links)
    }

    fn read_failure_count(&self, id: LinkId) -> Result<u32, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT consecutive_failures FROM links WHERE id = ?1",
            [id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or(StoreError::NotFound { id })
    }

    fn write_link_status(&self, id: LinkId, update: &StatusUpdate) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE links SET
                status = ?1,
                status_code = ?2,
                error_message = ?3,
                last_checked_at = ?4,
                consecutive_failures = ?5,
                last_verified_at = COALESCE(?6, last_verified_at)
             WHERE id = ?7",
            params![
                update.status.as_str(),
                update.status_code,
                update.error_message,
                update.checked_at.timestamp_millis(),
                update.consecutive_failures,
                update.verified_at.map(|t| t.timestamp_millis()),
                id,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound { id });
        }
        Ok(())
    }

    fn delete_link(&self, id: LinkId) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM links WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(StoreError::NotFound { id });
        }
        Ok(())
    }

    fn insert_link(&self, url: &str) -> Result<Option<LinkId>, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO links (url, created_at) VALUES (?1, ?2)",
            params![url, Utc::now().timestamp_millis()],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        Ok(Some(conn.last_insert_rowid()))
    }

    fn get_link(&self, id: LinkId) -> Result<LinkRecord, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM links WHERE id = ?1"),
            [id],
            record_from_row,
        )
        .optional()?
        .ok_or(StoreError::NotFound { id })
    }

    fn list_links(&self) -> Result<Vec<LinkRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {RECORD_COLUMNS} FROM links ORDER BY id"))?;
        let links = stmt
            .query_map([], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    fn link_stats(&self, due_before: DateTime<Utc>) -> Result<LinkStats, StoreError> {
        let conn = self.conn()?;
        let stats = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(status = 'live'), 0),
                    COALESCE(SUM(status = 'dead'), 0),
                    COALESCE(SUM(status = 'unknown'), 0),
                    COALESCE(SUM(last_checked_at IS NULL OR last_checked_at < ?1), 0)
             FROM links",
            [due_before.timestamp_millis()],
            |row| {
                Ok(LinkStats {
                    total: row.get::<_, i64>(0)? as u64,
                    live: row.get::<_, i64>(1)? as u64,
                    dead: row.get::<_, i64>(2)? as u64,
                    unknown: row.get::<_, i64>(3)? as u64,
                    due: row.get::<_, i64>(4)? as u64,
                })
            },
        )?;
        Ok(stats)
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<LinkRecord> {
    let status: String = row.get(2)?;
    let status = status.parse::<LinkStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into())
    })?;
    Ok(LinkRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        status,
        status_code: row.get(3)?,
        error_message: row.get(4)?,
        last_checked_at: row.get::<_, Option<i64>>(5)?.map(from_millis),
        last_verified_at: row.get::<_, Option<i64>>(6)?.map(from_millis),
        consecutive_failures: row.get(7)?,
    })
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

// src/store/models.rs
// =============================================================================
// Record types for the link store.
//
// LinkRecord is the full row. The checker mostly deals with the two narrow
// views: DueLink (what a batch fetches) and StatusUpdate (what a check writes).
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Primary key of a link row.
pub type LinkId = i64;

/// Health of a link as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Live,
    Dead,
    /// Never checked yet
    Unknown,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Live => "live",
            LinkStatus::Dead => "dead",
            LinkStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(LinkStatus::Live),
            "dead" => Ok(LinkStatus::Dead),
            "unknown" => Ok(LinkStatus::Unknown),
            other => Err(format!("unknown link status: {other}")),
        }
    }
}

/// A link selected for checking.
#[derive(Debug, Clone, PartialEq)]
pub struct DueLink {
    pub id: LinkId,
    pub url: String,
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// A stored link, as far as the checker is concerned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkRecord {
    pub id: LinkId,
    pub url: String,
    pub status: LinkStatus,
    pub status_code: Option<u16>,
    pub error_message: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Only ever moves forward, and only on a live check.
    pub last_verified_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

/// Fields written back after a check.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: LinkStatus,
    pub status_code: Option<u16>,
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
    pub consecutive_failures: u32,
    /// Set only for live checks; `None` leaves the stored value untouched.
    pub verified_at: Option<DateTime<Utc>>,
}

/// Aggregate view of the store, used by the status report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub total: u64,
    pub live: u64,
    pub dead: u64,
    pub unknown: u64,
    /// Links that the next batch would consider
    pub due: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [LinkStatus::Live, LinkStatus::Dead, LinkStatus::Unknown] {
            assert_eq!(status.as_str().parse::<LinkStatus>(), Ok(status));
        }
        assert!("gone".parse::<LinkStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&LinkStatus::Live).unwrap();
        assert_eq!(json, "\"live\"");
    }
}

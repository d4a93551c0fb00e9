// src/checker/engine.rs
// =============================================================================
// This module is the link checking engine.
//
// How a sweep works:
// 1. Fetch up to `batch_size` due links from the store (never-checked first)
// 2. Probe all of them concurrently and write each outcome back
// 3. A link that keeps failing is deleted once its consecutive failure
//    counter reaches `max_consecutive_failures`
// 4. If the batch came back full, wait a little and go again
//
// Each link is handled in its own task. One link blowing up (store error,
// panicking probe) is counted as an error for that link only; its siblings
// in the batch carry on.
// =============================================================================

use super::probe::{CheckResult, Prober};
use crate::store::{LinkId, LinkStats, LinkStatus, LinkStore, StatusUpdate, StoreError};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors that stop a batch or a sweep as a whole.
///
/// Per-link failures never show up here, they are tallied in `errors`.
#[derive(Debug, Error)]
pub enum CheckerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("A sweep is already in progress")]
    SweepInProgress,

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Tuning for batches and sweeps.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckerSettings {
    /// Links per batch, which is also the number of probes in flight at once
    pub batch_size: usize,
    /// A link is deleted when its failure counter reaches this value
    pub max_consecutive_failures: u32,
    /// A link is due again once its last check is older than this
    pub recheck_after: Duration,
    /// Pause between two full batches
    pub batch_delay: Duration,
}

impl Default for CheckerSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_consecutive_failures: 3,
            recheck_after: Duration::from_secs(24 * 60 * 60),
            batch_delay: Duration::from_secs(1),
        }
    }
}

/// What `update_link_status` did with a check result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The link row was written with this status
    Stored(LinkStatus),
    /// The link crossed the failure threshold and is gone
    Deleted,
}

impl UpdateOutcome {
    pub fn is_deleted(&self) -> bool {
        matches!(self, UpdateOutcome::Deleted)
    }
}

/// Tally of one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub checked: usize,
    pub live: usize,
    pub dead: usize,
    pub deleted: usize,
    pub errors: usize,
}

/// Tally of a whole sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepResult {
    /// Number of batch rounds, including the final short (or empty) one
    pub batches: usize,
    pub checked: usize,
    pub live: usize,
    pub dead: usize,
    pub deleted: usize,
    pub errors: usize,
    pub duration_ms: u64,
}

impl SweepResult {
    fn absorb(&mut self, batch: &BatchResult) {
        self.batches += 1;
        self.checked += batch.checked;
        self.live += batch.live;
        self.dead += batch.dead;
        self.deleted += batch.deleted;
        self.errors += batch.errors;
    }
}

/// Drives probes against the store.
pub struct LinkChecker {
    store: Arc<dyn LinkStore>,
    prober: Arc<dyn Prober>,
    settings: CheckerSettings,
    // Held for the whole of check_all
    sweep_lock: tokio::sync::Mutex<()>,
}

impl LinkChecker {
    pub fn new(
        store: Arc<dyn LinkStore>,
        prober: Arc<dyn Prober>,
        settings: CheckerSettings,
    ) -> Self {
        Self {
            store,
            prober,
            settings,
            sweep_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &CheckerSettings {
        &self.settings
    }

    /// Probe a single URL without touching the store.
    pub async fn check_link(&self, url: &str) -> CheckResult {
        self.prober.check_link(url).await
    }

    /// Fold a check result into the stored link, deleting it if it has now
    /// failed too many times in a row.
    pub fn update_link_status(
        &self,
        id: LinkId,
        result: &CheckResult,
    ) -> Result<UpdateOutcome, StoreError> {
        apply_check_result(
            self.store.as_ref(),
            self.settings.max_consecutive_failures,
            id,
            result,
        )
    }

    /// Check one batch of due links.
    ///
    /// An empty batch means nothing is due; no probe is made in that case.
    pub async fn check_batch(&self) -> Result<BatchResult, CheckerError> {
        let due_before = due_cutoff(self.settings.recheck_after);
        let links = self
            .store
            .fetch_due_links(self.settings.batch_size, due_before)?;

        if links.is_empty() {
            debug!("No links due for checking");
            return Ok(BatchResult::default());
        }

        debug!("Checking batch of {} link(s)", links.len());

        // One task per link, all in flight at once. The batch size is the
        // concurrency limit.
        let tasks = links.into_iter().map(|link| {
            let store = Arc::clone(&self.store);
            let prober = Arc::clone(&self.prober);
            let max_failures = self.settings.max_consecutive_failures;
            let id = link.id;
            let url = link.url;
            let handle = tokio::spawn({
                let url = url.clone();
                async move {
                    let result = prober.check_link(&url).await;
                    apply_check_result(store.as_ref(), max_failures, id, &result)
                }
            });
            async move { (id, url, handle.await) }
        });

        let mut batch = BatchResult::default();
        for (id, url, outcome) in join_all(tasks).await {
            match outcome {
                Ok(Ok(outcome)) => {
                    batch.checked += 1;
                    match outcome {
                        UpdateOutcome::Stored(LinkStatus::Live) => batch.live += 1,
                        UpdateOutcome::Stored(_) => batch.dead += 1,
                        UpdateOutcome::Deleted => batch.deleted += 1,
                    }
                }
                Ok(Err(e)) => {
                    batch.errors += 1;
                    error!(link_id = id, url = %url, error = %e, "Failed to update link");
                }
                Err(e) => {
                    batch.errors += 1;
                    error!(link_id = id, url = %url, error = %e, "Link check task failed");
                }
            }
        }

        info!(
            checked = batch.checked,
            live = batch.live,
            dead = batch.dead,
            deleted = batch.deleted,
            errors = batch.errors,
            "Batch complete"
        );
        Ok(batch)
    }

    /// Run batches until one comes back short of `batch_size`.
    ///
    /// Refuses to start while another sweep is running on this checker.
    pub async fn check_all(&self) -> Result<SweepResult, CheckerError> {
        let _sweep = self
            .sweep_lock
            .try_lock()
            .map_err(|_| CheckerError::SweepInProgress)?;

        let started = Instant::now();
        let mut sweep = SweepResult::default();
        info!("Starting link sweep");

        loop {
            let batch = self.check_batch().await?;
            sweep.absorb(&batch);

            // Errored links do not count as checked, so a batch with errors
            // can end the sweep early. They are picked up next time.
            if batch.checked < self.settings.batch_size {
                break;
            }

            tokio::time::sleep(self.settings.batch_delay).await;
        }

        sweep.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            batches = sweep.batches,
            checked = sweep.checked,
            live = sweep.live,
            dead = sweep.dead,
            deleted = sweep.deleted,
            errors = sweep.errors,
            duration_ms = sweep.duration_ms,
            "Link sweep complete"
        );
        Ok(sweep)
    }

    /// Counts by status and how many links are currently due.
    pub fn link_stats(&self) -> Result<LinkStats, StoreError> {
        self.store
            .link_stats(due_cutoff(self.settings.recheck_after))
    }
}

// Standalone so it can run inside a spawned per-link task.
fn apply_check_result(
    store: &dyn LinkStore,
    max_failures: u32,
    id: LinkId,
    result: &CheckResult,
) -> Result<UpdateOutcome, StoreError> {
    let current = store.read_failure_count(id)?;

    // One live check wipes the slate clean
    let failures = if result.is_live() {
        0
    } else {
        current.saturating_add(1)
    };

    if failures >= max_failures {
        store.delete_link(id)?;
        warn!(
            link_id = id,
            url = %result.url,
            failures,
            error = result.error_message.as_deref().unwrap_or(""),
            "Deleted link after repeated failures"
        );
        return Ok(UpdateOutcome::Deleted);
    }

    let update = StatusUpdate {
        status: result.status,
        status_code: result.status_code,
        error_message: result.error_message.clone(),
        checked_at: result.checked_at,
        consecutive_failures: failures,
        verified_at: result.is_live().then_some(result.checked_at),
    };
    store.write_link_status(id, &update)?;
    Ok(UpdateOutcome::Stored(result.status))
}

// Links last checked before this instant are due.
fn due_cutoff(recheck_after: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(recheck_after)
        .ok()
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

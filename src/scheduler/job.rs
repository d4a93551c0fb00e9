// src/scheduler/job.rs
// =============================================================================
// The contract between the scheduler and the work it runs.
//
// A job is anything with an async `run()`. The scheduler decides WHEN it
// runs; the job decides WHAT happens. Nothing in here knows about links.
// =============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Whatever a job wants to report about a run; logged by the scheduler.
pub type JobOutput = serde_json::Value;

/// Errors a job run can end with.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Failed to encode job output: {0}")]
    Output(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A unit of recurring work.
#[async_trait]
pub trait Job: Send + Sync {
    async fn run(&self) -> Result<JobOutput, JobError>;
}

/// Read-only snapshot of one registered job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub name: String,
    pub interval_secs: u64,
    /// When the most recent run started
    pub last_run: Option<DateTime<Utc>>,
    /// When the next run is expected, as computed at the start of the last one
    pub next_run: Option<DateTime<Utc>>,
    /// A run is in flight right now
    pub running: bool,
    /// The job's timer is armed
    pub active: bool,
    pub run_count: u64,
    /// Ticks dropped because the previous run had not finished
    pub skipped_runs: u64,
    pub last_error: Option<String>,
}

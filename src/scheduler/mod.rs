// src/scheduler/mod.rs
// =============================================================================
// This module runs named jobs on a fixed interval.
//
// Guarantees:
// - A job never overlaps itself. If a tick fires while the previous run is
//   still going, that tick is skipped (not queued).
// - A failing or panicking job is logged and the timer keeps going.
// - stop() cancels the timers only; a run already in flight finishes.
//
// Submodules:
// - job: the Job trait, its error type and the status snapshot
// - registry: the JobScheduler itself (job table + timers)
// =============================================================================

mod job;
mod registry;

pub use job::{Job, JobError, JobOutput, JobStatus};
pub use registry::JobScheduler;

use thiserror::Error;

/// Errors from scheduler bookkeeping calls.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Job not found: {name}")]
    JobNotFound { name: String },

    #[error("Invalid interval for job {name}: must be greater than zero")]
    InvalidInterval { name: String },
}

// src/checker/job.rs
// =============================================================================
// The link checker as a scheduled job.
//
// The scheduler knows nothing about links; it only sees a `Job`. This adapter
// runs one full sweep per invocation and hands the tally back as JSON so the
// scheduler can log it.
// =============================================================================

use super::engine::LinkChecker;
use crate::scheduler::{Job, JobError, JobOutput};
use async_trait::async_trait;
use std::sync::Arc;

/// Name the sweep job is registered under.
pub const LINK_CHECK_JOB: &str = "link-checker";

pub struct LinkCheckJob {
    checker: Arc<LinkChecker>,
}

impl LinkCheckJob {
    pub fn new(checker: Arc<LinkChecker>) -> Self {
        Self { checker }
    }
}

#[async_trait]
impl Job for LinkCheckJob {
    async fn run(&self) -> Result<JobOutput, JobError> {
        let sweep = self
            .checker
            .check_all()
            .await
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;
        Ok(serde_json::to_value(sweep)?)
    }
}

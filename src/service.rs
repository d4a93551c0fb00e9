// src/service.rs
// =============================================================================
// The operator-facing surface of the link checker.
//
// Wires one LinkChecker into one JobScheduler and exposes what a human (or a
// CLI command) needs on top of the periodic sweep:
// - trigger a sweep right now
// - probe a single URL without touching the store
// - look at job and link statistics
// - shut down without cutting a running sweep off mid-batch
// =============================================================================

use crate::checker::{
    CheckResult, CheckerError, LinkCheckJob, LinkChecker, SweepResult, LINK_CHECK_JOB,
};
use crate::scheduler::{JobScheduler, JobStatus, SchedulerError};
use crate::store::{LinkStats, StoreError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

// How often shutdown re-checks whether the sweep has finished
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Snapshot for the `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub jobs: Vec<JobStatus>,
    pub links: LinkStats,
}

pub struct CheckerService {
    checker: Arc<LinkChecker>,
    scheduler: Arc<JobScheduler>,
}

impl CheckerService {
    /// Register the sweep job on `scheduler`, running every `sweep_interval`.
    ///
    /// The job is only registered; call `start` to arm it.
    pub fn new(
        checker: Arc<LinkChecker>,
        scheduler: Arc<JobScheduler>,
        sweep_interval: Duration,
    ) -> Result<Self, SchedulerError> {
        let job = Arc::new(LinkCheckJob::new(Arc::clone(&checker)));
        scheduler.add_job(LINK_CHECK_JOB, job, sweep_interval)?;
        Ok(Self { checker, scheduler })
    }

    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    pub fn start(&self) {
        self.scheduler.start();
    }

    pub fn stop(&self) {
        self.scheduler.stop();
    }

    /// Stop the schedule, then wait up to `grace` for a sweep in flight.
    ///
    /// Returns false if the sweep was still running when `grace` ran out.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.scheduler.stop();
        if !self.sweep_running() {
            return true;
        }

        info!(grace_secs = grace.as_secs(), "Waiting for the running sweep to finish");
        let drained = tokio::time::timeout(grace, async {
            while self.sweep_running() {
                tokio::time::sleep(SHUTDOWN_POLL).await;
            }
        })
        .await
        .is_ok();

        if !drained {
            warn!("Sweep still running after {:?}, exiting anyway", grace);
        }
        drained
    }

    fn sweep_running(&self) -> bool {
        self.scheduler
            .job_status(LINK_CHECK_JOB)
            .is_some_and(|status| status.running)
    }

    /// Run one full sweep now, outside the schedule.
    ///
    /// Fails with `SweepInProgress` if the scheduled sweep is mid-run.
    pub async fn trigger_sweep(&self) -> Result<SweepResult, CheckerError> {
        info!("Manual sweep requested");
        self.checker.check_all().await
    }

    /// Diagnostic probe; nothing is written to the store.
    pub async fn probe_url(&self, url: &str) -> CheckResult {
        self.checker.check_link(url).await
    }

    pub fn status(&self) -> Result<ServiceStatus, StoreError> {
        Ok(ServiceStatus {
            jobs: self.scheduler.all_job_statuses(),
            links: self.checker.link_stats()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::{CheckerSettings, Prober};
    use crate::store::{LinkStatus, LinkStore, SqliteLinkStore};
    use async_trait::async_trait;

    struct DeadOnlyFor(&'static str);

    #[async_trait]
    impl Prober for DeadOnlyFor {
        async fn check_link(&self, url: &str) -> CheckResult {
            if url == self.0 {
                CheckResult::dead(url, Some(404), "HTTP 404 Not Found".to_string())
            } else {
                CheckResult::live(url, 200)
            }
        }
    }

    // Live after a delay, so a sweep stays in flight for a while
    struct Slow(Duration);

    #[async_trait]
    impl Prober for Slow {
        async fn check_link(&self, url: &str) -> CheckResult {
            tokio::time::sleep(self.0).await;
            CheckResult::live(url, 200)
        }
    }

    fn service(store: Arc<SqliteLinkStore>) -> CheckerService {
        service_with(store, Arc::new(DeadOnlyFor("https://gone.test")))
    }

    fn service_with(store: Arc<SqliteLinkStore>, prober: Arc<dyn Prober>) -> CheckerService {
        let checker = Arc::new(LinkChecker::new(
            store,
            prober,
            CheckerSettings {
                batch_delay: Duration::ZERO,
                ..Default::default()
            },
        ));
        CheckerService::new(
            checker,
            Arc::new(JobScheduler::new()),
            Duration::from_secs(24 * 60 * 60),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_registers_sweep_job_without_arming_it() {
        let service = service(Arc::new(SqliteLinkStore::in_memory().unwrap()));
        let status = service.scheduler().job_status(LINK_CHECK_JOB).unwrap();
        assert_eq!(status.interval_secs, 24 * 60 * 60);
        assert!(!status.active);
        assert!(!service.scheduler().is_running());
    }

    #[tokio::test]
    async fn test_trigger_sweep_updates_store() {
        let store = Arc::new(SqliteLinkStore::in_memory().unwrap());
        let ok = store.insert_link("https://ok.test").unwrap().unwrap();
        let gone = store.insert_link("https://gone.test").unwrap().unwrap();
        let service = service(Arc::clone(&store));

        let sweep = service.trigger_sweep().await.unwrap();
        assert_eq!(sweep.checked, 2);
        assert_eq!(sweep.live, 1);
        assert_eq!(sweep.dead, 1);

        assert_eq!(store.get_link(ok).unwrap().status, LinkStatus::Live);
        let record = store.get_link(gone).unwrap();
        assert_eq!(record.status, LinkStatus::Dead);
        assert_eq!(record.consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_probe_url_does_not_persist() {
        let store = Arc::new(SqliteLinkStore::in_memory().unwrap());
        let service = service(Arc::clone(&store));

        let result = service.probe_url("https://gone.test").await;
        assert_eq!(result.status, LinkStatus::Dead);
        assert_eq!(result.status_code, Some(404));
        assert!(store.list_links().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_reports_jobs_and_links() {
        let store = Arc::new(SqliteLinkStore::in_memory().unwrap());
        store.insert_link("https://ok.test").unwrap();
        store.insert_link("https://gone.test").unwrap();
        let service = service(Arc::clone(&store));

        let before = service.status().unwrap();
        assert_eq!(before.jobs.len(), 1);
        assert_eq!(before.jobs[0].name, LINK_CHECK_JOB);
        assert_eq!(before.links.total, 2);
        assert_eq!(before.links.unknown, 2);
        assert_eq!(before.links.due, 2);

        service.trigger_sweep().await.unwrap();
        let after = service.status().unwrap();
        assert_eq!(after.links.live, 1);
        assert_eq!(after.links.dead, 1);
        assert_eq!(after.links.due, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_running_sweep() {
        let store = Arc::new(SqliteLinkStore::in_memory().unwrap());
        let id = store.insert_link("https://slow.test").unwrap().unwrap();
        let service = service_with(Arc::clone(&store), Arc::new(Slow(Duration::from_secs(5))));

        service.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(service.scheduler().job_status(LINK_CHECK_JOB).unwrap().running);

        assert!(service.shutdown(Duration::from_secs(30)).await);
        let status = service.scheduler().job_status(LINK_CHECK_JOB).unwrap();
        assert!(!status.running);
        assert!(!status.active);
        assert_eq!(status.run_count, 1);
        assert_eq!(store.get_link(id).unwrap().status, LinkStatus::Live);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_gives_up_after_grace() {
        let store = Arc::new(SqliteLinkStore::in_memory().unwrap());
        store.insert_link("https://slow.test").unwrap();
        let service = service_with(store, Arc::new(Slow(Duration::from_secs(60))));

        service.start();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!service.shutdown(Duration::from_secs(1)).await);
        assert!(service.scheduler().job_status(LINK_CHECK_JOB).unwrap().running);
    }

    #[tokio::test]
    async fn test_shutdown_when_idle_returns_at_once() {
        let service = service(Arc::new(SqliteLinkStore::in_memory().unwrap()));
        assert!(service.shutdown(Duration::from_secs(1)).await);
    }
}

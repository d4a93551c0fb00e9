// src/scheduler/registry.rs
// =============================================================================
// JobScheduler: a table of named jobs, each with its own repeating timer.
//
// Per job:
//   Registered --start/start_job--> Armed --tick--> Running --done--> Armed
//   Armed/Running --remove/stop--> Cancelled
//
// Every tick spawns the run as its own task, so a slow job never delays the
// timer. The run task checks the job's `running` flag first and bails out if
// the previous run is still in flight.
//
// Rust concepts:
// - tokio::time::interval: first tick completes immediately, then every period
// - JoinHandle::abort: cancels the timer task without touching spawned runs
// - catch_unwind: a panicking job is reported like any other failure
// =============================================================================

use super::job::{Job, JobStatus};
use super::SchedulerError;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

// Mutable per-job state shared between the table and the run tasks.
#[derive(Debug, Default)]
struct JobRuntime {
    running: bool,
    last_run: Option<DateTime<Utc>>,
    next_run: Option<DateTime<Utc>>,
    run_count: u64,
    skipped_runs: u64,
    last_error: Option<String>,
}

type SharedRuntime = Arc<Mutex<JobRuntime>>;

struct JobEntry {
    job: Arc<dyn Job>,
    interval: Duration,
    runtime: SharedRuntime,
    timer: Option<JoinHandle<()>>,
}

impl JobEntry {
    fn is_armed(&self) -> bool {
        self.timer.as_ref().is_some_and(|timer| !timer.is_finished())
    }

    fn arm(&mut self, name: &str) {
        self.disarm();
        self.timer = Some(spawn_timer(
            name.to_string(),
            Arc::clone(&self.job),
            self.interval,
            Arc::clone(&self.runtime),
        ));
    }

    fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn status(&self, name: &str) -> JobStatus {
        let runtime = lock(&self.runtime);
        JobStatus {
            name: name.to_string(),
            interval_secs: self.interval.as_secs(),
            last_run: runtime.last_run,
            next_run: runtime.next_run,
            running: runtime.running,
            active: self.is_armed(),
            run_count: runtime.run_count,
            skipped_runs: runtime.skipped_runs,
            last_error: runtime.last_error.clone(),
        }
    }
}

/// Runs registered jobs on fixed intervals, one run per job at a time.
///
/// Construct one at startup, register jobs, call [`start`](Self::start);
/// call [`stop`](Self::stop) on shutdown. Dropping the scheduler cancels
/// every timer as well.
pub struct JobScheduler {
    jobs: Mutex<HashMap<String, JobEntry>>,
    started: AtomicBool,
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl JobScheduler {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Register `job` under `name`, replacing (and cancelling) any job already
    /// registered under that name. Nothing runs until `start` or `start_job`.
    pub fn add_job(
        &self,
        name: impl Into<String>,
        job: Arc<dyn Job>,
        interval: Duration,
    ) -> Result<(), SchedulerError> {
        let name = name.into();
        if interval.is_zero() {
            return Err(SchedulerError::InvalidInterval { name });
        }

        let mut jobs = lock(&self.jobs);
        // The replacement inherits the old runtime, so a run of the old job
        // that is still in flight keeps the name busy until it finishes.
        let runtime = match jobs.remove(&name) {
            Some(mut previous) => {
                previous.disarm();
                info!(job = %name, "Replacing job");
                previous.runtime
            }
            None => SharedRuntime::default(),
        };
        jobs.insert(
            name.clone(),
            JobEntry {
                job,
                interval,
                runtime,
                timer: None,
            },
        );
        info!(job = %name, interval_secs = interval.as_secs(), "Job registered");
        Ok(())
    }

    /// Cancel and forget a job. Returns false if there was no such job.
    pub fn remove_job(&self, name: &str) -> bool {
        match lock(&self.jobs).remove(name) {
            Some(mut entry) => {
                entry.disarm();
                info!(job = %name, "Job removed");
                true
            }
            None => false,
        }
    }

    /// Run every registered job now and then on its interval.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already running");
            return;
        }

        let mut jobs = lock(&self.jobs);
        for (name, entry) in jobs.iter_mut() {
            // Already armed through start_job
            if !entry.is_armed() {
                entry.arm(name);
            }
        }
        info!(jobs = jobs.len(), "Scheduler started");
    }

    /// Arm a single job: run it now and then on its interval.
    pub fn start_job(&self, name: &str) -> Result<(), SchedulerError> {
        let mut jobs = lock(&self.jobs);
        let entry = jobs.get_mut(name).ok_or_else(|| SchedulerError::JobNotFound {
            name: name.to_string(),
        })?;
        if entry.is_armed() {
            warn!(job = %name, "Job already armed");
            return Ok(());
        }
        entry.arm(name);
        info!(job = %name, "Job started");
        Ok(())
    }

    /// Cancel every timer, including ones armed through `start_job`.
    /// Runs already in flight are left to finish.
    pub fn stop(&self) {
        let was_started = self.started.swap(false, Ordering::SeqCst);

        let mut disarmed = 0;
        for entry in lock(&self.jobs).values_mut() {
            if entry.is_armed() {
                disarmed += 1;
            }
            entry.disarm();
        }

        if !was_started && disarmed == 0 {
            warn!("Scheduler is not running");
            return;
        }
        info!(timers = disarmed, "Scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn job_status(&self, name: &str) -> Option<JobStatus> {
        lock(&self.jobs).get(name).map(|entry| entry.status(name))
    }

    /// Snapshots of all jobs, sorted by name.
    pub fn all_job_statuses(&self) -> Vec<JobStatus> {
        let mut statuses: Vec<JobStatus> = lock(&self.jobs)
            .iter()
            .map(|(name, entry)| entry.status(name))
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        for entry in lock(&self.jobs).values_mut() {
            entry.disarm();
        }
    }
}

fn spawn_timer(
    name: String,
    job: Arc<dyn Job>,
    interval: Duration,
    runtime: SharedRuntime,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            tokio::spawn(run_job(
                name.clone(),
                Arc::clone(&job),
                interval,
                Arc::clone(&runtime),
            ));
        }
    })
}

async fn run_job(name: String, job: Arc<dyn Job>, interval: Duration, runtime: SharedRuntime) {
    {
        let mut state = lock(&runtime);
        if state.running {
            state.skipped_runs += 1;
            warn!(job = %name, "Previous run still in progress, skipping this tick");
            return;
        }
        let now = Utc::now();
        state.running = true;
        state.last_run = Some(now);
        state.next_run = chrono::Duration::from_std(interval)
            .ok()
            .and_then(|interval| now.checked_add_signed(interval));
    }

    info!(job = %name, "Job started");
    let outcome = AssertUnwindSafe(job.run()).catch_unwind().await;

    let mut state = lock(&runtime);
    state.running = false;
    state.run_count += 1;
    match outcome {
        Ok(Ok(output)) => {
            state.last_error = None;
            info!(job = %name, output = %output, "Job completed");
        }
        Ok(Err(e)) => {
            state.last_error = Some(e.to_string());
            error!(job = %name, error = %e, "Job failed");
        }
        Err(_) => {
            state.last_error = Some("job panicked".to_string());
            error!(job = %name, "Job panicked");
        }
    }
}

// A panicking job never holds these locks, so a poisoned one is still sound.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why std::sync::Mutex and not tokio::sync::Mutex?
//    - The locks are only held for a few field reads/writes, never across .await
//    - A std Mutex is cheaper and usable from Drop and non-async methods
//
// 2. What happens to a run when its timer is aborted?
//    - Each tick spawns run_job as a separate task
//    - Aborting the timer task only stops future ticks
//    - The spawned run keeps going and clears `running` when it ends
//
// 3. Why does a replaced job keep the old runtime?
//    - The name is what must never run twice at once
//    - Sharing the runtime means the old run's `running` flag still blocks
//      the new job until that run is done
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{JobError, JobOutput};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::sleep;

    #[derive(Default)]
    struct TestJob {
        work: Duration,
        fail: bool,
        panic: bool,
        calls: AtomicUsize,
        completed: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl TestJob {
        fn taking(work: Duration) -> Arc<Self> {
            Arc::new(Self {
                work,
                ..Default::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Job for TestJob {
        async fn run(&self) -> Result<JobOutput, JobError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            sleep(self.work).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.panic {
                panic!("job exploded");
            }
            if self.fail {
                return Err(JobError::ExecutionFailed("boom".to_string()));
            }
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::json!({ "ok": true }))
        }
    }

    const SECOND: Duration = Duration::from_secs(1);

    #[tokio::test(start_paused = true)]
    async fn test_slow_job_never_overlaps_itself() {
        let scheduler = JobScheduler::new();
        let job = TestJob::taking(Duration::from_millis(2500));
        scheduler.add_job("slow", job.clone(), SECOND).unwrap();

        scheduler.start();
        sleep(Duration::from_millis(5200)).await;

        // Runs at t=0 and t=3; ticks at 1, 2, 4, 5 land on a busy job
        assert_eq!(job.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(job.calls(), 2);
        let status = scheduler.job_status("slow").unwrap();
        assert!(status.skipped_runs >= 3);
        assert!(status.running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_job_does_not_run_anything() {
        let scheduler = JobScheduler::new();
        let job = TestJob::taking(Duration::ZERO);
        scheduler.add_job("idle", job.clone(), SECOND).unwrap();

        sleep(Duration::from_secs(5)).await;
        assert_eq!(job.calls(), 0);
        let status = scheduler.job_status("idle").unwrap();
        assert!(!status.active);
        assert!(status.last_run.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_runs_immediately_then_on_interval() {
        let scheduler = JobScheduler::new();
        let job = TestJob::taking(Duration::ZERO);
        scheduler.add_job("tick", job.clone(), SECOND).unwrap();

        scheduler.start();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(job.calls(), 1);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(job.calls(), 3);

        let status = scheduler.job_status("tick").unwrap();
        assert!(status.active);
        assert!(!status.running);
        assert_eq!(status.run_count, 3);
        assert_eq!(status.interval_secs, 1);
        let (last, next) = (status.last_run.unwrap(), status.next_run.unwrap());
        assert_eq!((next - last).num_seconds(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_job_keeps_its_timer() {
        let scheduler = JobScheduler::new();
        let job = Arc::new(TestJob {
            fail: true,
            ..Default::default()
        });
        scheduler.add_job("broken", job.clone(), SECOND).unwrap();

        scheduler.start();
        sleep(Duration::from_millis(3500)).await;

        assert_eq!(job.calls(), 4);
        let status = scheduler.job_status("broken").unwrap();
        assert!(!status.running);
        assert!(status.active);
        assert!(status.last_error.unwrap().contains("boom"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_job_clears_running_flag() {
        let scheduler = JobScheduler::new();
        let job = Arc::new(TestJob {
            panic: true,
            ..Default::default()
        });
        scheduler.add_job("panicky", job.clone(), SECOND).unwrap();

        scheduler.start();
        sleep(Duration::from_millis(1500)).await;

        assert_eq!(job.calls(), 2);
        let status = scheduler.job_status("panicky").unwrap();
        assert!(!status.running);
        assert_eq!(status.last_error.as_deref(), Some("job panicked"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_further_runs() {
        let scheduler = JobScheduler::new();
        let job = TestJob::taking(Duration::ZERO);
        scheduler.add_job("tick", job.clone(), SECOND).unwrap();

        scheduler.start();
        sleep(Duration::from_millis(1500)).await;
        assert_eq!(job.calls(), 2);

        scheduler.stop();
        assert!(!scheduler.is_running());
        sleep(Duration::from_secs(5)).await;
        assert_eq!(job.calls(), 2);
        assert!(!scheduler.job_status("tick").unwrap().active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_lets_in_flight_run_finish() {
        let scheduler = JobScheduler::new();
        let job = TestJob::taking(Duration::from_secs(3));
        scheduler.add_job("long", job.clone(), Duration::from_secs(60)).unwrap();

        scheduler.start();
        sleep(Duration::from_millis(100)).await;
        assert!(scheduler.job_status("long").unwrap().running);

        scheduler.stop();
        sleep(Duration::from_secs(5)).await;
        assert_eq!(job.completed.load(Ordering::SeqCst), 1);
        assert!(!scheduler.job_status("long").unwrap().running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_a_no_op() {
        let scheduler = JobScheduler::new();
        let job = TestJob::taking(Duration::ZERO);
        scheduler.add_job("once", job.clone(), Duration::from_secs(60)).unwrap();

        scheduler.start();
        scheduler.start();
        sleep(Duration::from_millis(500)).await;
        assert_eq!(job.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacing_a_job_cancels_the_old_timer() {
        let scheduler = JobScheduler::new();
        let old = TestJob::taking(Duration::ZERO);
        let new = TestJob::taking(Duration::ZERO);
        scheduler.add_job("job", old.clone(), SECOND).unwrap();
        scheduler.start();
        sleep(Duration::from_millis(500)).await;
        assert_eq!(old.calls(), 1);

        scheduler.add_job("job", new.clone(), SECOND).unwrap();
        sleep(Duration::from_secs(3)).await;
        assert_eq!(old.calls(), 1);
        assert_eq!(new.calls(), 0);

        scheduler.start_job("job").unwrap();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(new.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacement_waits_for_old_run_in_flight() {
        let scheduler = JobScheduler::new();
        let old = TestJob::taking(Duration::from_secs(3));
        let new = TestJob::taking(Duration::ZERO);
        scheduler.add_job("job", old.clone(), Duration::from_secs(60)).unwrap();
        scheduler.start();
        sleep(Duration::from_millis(100)).await;
        assert!(scheduler.job_status("job").unwrap().running);

        // Replaced and re-armed while the old run still has ~3s to go
        scheduler.add_job("job", new.clone(), SECOND).unwrap();
        scheduler.start_job("job").unwrap();
        sleep(Duration::from_millis(2400)).await;

        // Ticks at 0.1, 1.1 and 2.1 all found the name busy
        assert_eq!(new.calls(), 0);
        let status = scheduler.job_status("job").unwrap();
        assert!(status.running);
        assert!(status.skipped_runs >= 3);

        // Old run ends at 3.0, the tick at 3.1 runs the replacement
        sleep(Duration::from_secs(1)).await;
        assert_eq!(old.completed.load(Ordering::SeqCst), 1);
        assert_eq!(new.calls(), 1);
        assert_eq!(old.calls() + new.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_timers_armed_by_start_job() {
        let scheduler = JobScheduler::new();
        let job = TestJob::taking(Duration::ZERO);
        scheduler.add_job("solo", job.clone(), SECOND).unwrap();

        scheduler.start_job("solo").unwrap();
        sleep(Duration::from_millis(1500)).await;
        assert_eq!(job.calls(), 2);
        assert!(!scheduler.is_running());

        scheduler.stop();
        assert!(!scheduler.job_status("solo").unwrap().active);
        sleep(Duration::from_secs(5)).await;
        assert_eq!(job.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_job_cancels_and_forgets() {
        let scheduler = JobScheduler::new();
        let job = TestJob::taking(Duration::ZERO);
        scheduler.add_job("gone", job.clone(), SECOND).unwrap();
        scheduler.start();
        sleep(Duration::from_millis(500)).await;

        assert!(scheduler.remove_job("gone"));
        assert!(!scheduler.remove_job("gone"));
        assert!(scheduler.job_status("gone").is_none());

        sleep(Duration::from_secs(3)).await;
        assert_eq!(job.calls(), 1);
    }

    #[tokio::test]
    async fn test_start_job_unknown_name() {
        let scheduler = JobScheduler::new();
        assert_eq!(
            scheduler.start_job("nope"),
            Err(SchedulerError::JobNotFound {
                name: "nope".to_string()
            })
        );
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let scheduler = JobScheduler::new();
        let result = scheduler.add_job("busy", TestJob::taking(Duration::ZERO), Duration::ZERO);
        assert!(matches!(result, Err(SchedulerError::InvalidInterval { .. })));
    }

    #[test]
    fn test_statuses_sorted_by_name() {
        let scheduler = JobScheduler::new();
        for name in ["b", "c", "a"] {
            scheduler
                .add_job(name, TestJob::taking(Duration::ZERO), SECOND)
                .unwrap();
        }
        let names: Vec<String> = scheduler
            .all_job_statuses()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}

//! Job scheduler: one-off and periodic processing cycles.
//!
//! The Scheduler provides:
//! - `run_once()`: one cycle on the caller's task
//! - `start()`: a single recurring job on a background task
//! - `stop()`: cancel future runs, waiting for an in-flight cycle
//!
//! A recurring job never overlaps itself. Each cycle runs on its own task, so
//! a panicking cycle is logged and the next tick still fires.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::error::JobError;
use crate::pipeline::{CycleOutcome, Orchestrator};

/// Identifier of the recurring processing job.
pub const JOB_ID: &str = "email_processor";

/// Human name of the recurring processing job.
pub const JOB_NAME: &str = "Email Processing Job";

/// Anything that can run a processing cycle.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_cycle(&self) -> CycleOutcome;
}

#[async_trait]
impl CycleRunner for Orchestrator {
    async fn run_cycle(&self) -> CycleOutcome {
        Orchestrator::run_cycle(self).await
    }
}

/// The active recurring job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleJob {
    pub id: String,
    pub name: String,
    pub interval: Duration,
    pub started_at: DateTime<Utc>,
}

impl ScheduleJob {
    fn new(interval: Duration) -> Self {
        Self {
            id: JOB_ID.to_string(),
            name: JOB_NAME.to_string(),
            interval,
            started_at: Utc::now(),
        }
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval.as_secs()
    }
}

/// Tracked job handle.
struct TrackedJob {
    job: ScheduleJob,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Runs cycles once or on a fixed interval. At most one active job.
pub struct Scheduler {
    runner: Arc<dyn CycleRunner>,
    job: Mutex<Option<TrackedJob>>,
}

impl Scheduler {
    pub fn new(runner: Arc<dyn CycleRunner>) -> Self {
        Self {
            runner,
            job: Mutex::new(None),
        }
    }

    /// Run exactly one cycle and return its outcome.
    pub async fn run_once(&self) -> CycleOutcome {
        self.runner.run_cycle().await
    }

    /// Register the recurring job, first run one interval from now.
    pub async fn start(&self, interval_secs: u64) -> Result<ScheduleJob, JobError> {
        self.start_every(Duration::from_secs(interval_secs)).await
    }

    /// [`Scheduler::start`] with a sub-second period.
    pub async fn start_every(&self, interval: Duration) -> Result<ScheduleJob, JobError> {
        if interval.is_zero() {
            return Err(JobError::InvalidInterval(0));
        }

        let mut slot = self.job.lock().await;
        if let Some(tracked) = slot.as_ref()
            && !tracked.handle.is_finished()
        {
            return Err(JobError::AlreadyRunning {
                id: tracked.job.id.clone(),
            });
        }

        let job = ScheduleJob::new(interval);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_job(Arc::clone(&self.runner), interval, stop_rx));

        info!(
            job = %job.id,
            name = %job.name,
            interval_secs = job.interval_secs(),
            "Scheduled job started"
        );

        *slot = Some(TrackedJob {
            job: job.clone(),
            stop_tx,
            handle,
        });
        Ok(job)
    }

    /// Cancel future runs and wait for an in-flight cycle. No-op without an
    /// active job.
    pub async fn stop(&self) {
        let Some(tracked) = self.job.lock().await.take() else {
            return;
        };

        // The loop may already be gone; either way it is told to stop.
        let _ = tracked.stop_tx.send(true);
        if let Err(e) = tracked.handle.await {
            warn!(job = %tracked.job.id, error = %e, "Scheduled job ended abnormally");
        }
        info!(job = %tracked.job.id, "Scheduled job stopped");
    }

    /// The current recurring job, if any.
    pub async fn active_job(&self) -> Option<ScheduleJob> {
        self.job
            .lock()
            .await
            .as_ref()
            .filter(|tracked| !tracked.handle.is_finished())
            .map(|tracked| tracked.job.clone())
    }

    pub async fn is_running(&self) -> bool {
        self.active_job().await.is_some()
    }
}

async fn run_job(runner: Arc<dyn CycleRunner>, interval: Duration, mut stop_rx: watch::Receiver<bool>) {
    let mut tick = tokio::time::interval_at(Instant::now() + interval, interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            _ = tick.tick() => {}
        }

        let runner = Arc::clone(&runner);
        match tokio::spawn(async move { runner.run_cycle().await }).await {
            Ok(outcome) => info!(%outcome, "Scheduled cycle finished"),
            Err(e) => error!(error = %e, "Scheduled cycle panicked, next run still scheduled"),
        }

        if *stop_rx.borrow() {
            break;
        }
    }
}

//! Job scheduler: records a job, then runs its work on a spawned task.
//!
//! Recording and running happen on one detached task, so dropping the
//! caller's future cannot leave a recorded job without its work. Whatever
//! happens inside the work (an `Err`, a panic) ends with the job in a
//! terminal state, and the terminal write is retried with backoff. Jobs cut
//! off by a process exit are failed by [`JobScheduler::fail_interrupted`].

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::{broadcast, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use synopsis_core::{defaults, Error, JobRecord, JobRepository, JobStatus, JobType, Result};

/// Configuration for the job scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum number of jobs executing at once. Queued work waits for a
    /// permit while its record already reads `running`.
    pub max_concurrent_jobs: usize,
    /// When false, submitted jobs are recorded and immediately failed.
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: defaults::JOB_MAX_CONCURRENT,
            enabled: true,
        }
    }
}

impl SchedulerConfig {
    /// Create config from environment variables.
    ///
    /// Reads `JOB_WORKER_ENABLED` and `JOB_MAX_CONCURRENT`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("JOB_WORKER_ENABLED") {
            config.enabled = v != "false" && v != "0";
        }
        if let Ok(v) = std::env::var("JOB_MAX_CONCURRENT") {
            if let Ok(n) = v.parse::<usize>() {
                config.max_concurrent_jobs = n.max(1);
            }
        }

        config
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max.max(1);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Lifecycle events broadcast to observers.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    /// Job record written, work spawned.
    Submitted { job_id: String, job_type: JobType },
    /// Work returned `Ok`.
    Completed {
        job_id: String,
        job_type: JobType,
        duration_ms: u64,
    },
    /// Work returned an error or panicked.
    Failed {
        job_id: String,
        job_type: JobType,
        error: String,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Submitted { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. } => job_id,
        }
    }
}

/// Runs submitted work on spawned tasks and tracks it in the job repository.
#[derive(Clone)]
pub struct JobScheduler {
    repo: Arc<dyn JobRepository>,
    permits: Arc<Semaphore>,
    event_tx: broadcast::Sender<JobEvent>,
    config: SchedulerConfig,
}

impl JobScheduler {
    pub fn new(repo: Arc<dyn JobRepository>, config: SchedulerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        let permits = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));

        info!(
            subsystem = "jobs",
            component = "scheduler",
            max_concurrent = config.max_concurrent_jobs,
            enabled = config.enabled,
            "Job scheduler initialized"
        );

        Self {
            repo,
            permits,
            event_tx,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Subscribe to job lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    /// Record `job_id` as running and execute `work` on a spawned task.
    ///
    /// Returns once the record is written. Fails only if the record cannot
    /// be created (for example a duplicate id); from then on every outcome
    /// of `work` lands in the job record.
    #[instrument(skip(self, work), fields(subsystem = "jobs", component = "scheduler", op = "submit"))]
    pub async fn submit<F, Fut>(&self, job_id: &str, job_type: JobType, work: F) -> Result<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (recorded_tx, recorded_rx) = oneshot::channel();
        let runner = JobRunner {
            repo: self.repo.clone(),
            permits: self.permits.clone(),
            event_tx: self.event_tx.clone(),
            job_id: job_id.to_string(),
            job_type,
            enabled: self.config.enabled,
        };
        tokio::spawn(runner.record_and_run(work, recorded_tx));

        recorded_rx.await.map_err(|_| {
            Error::Internal(format!("job {job_id} ended before it was recorded"))
        })?
    }

    /// Current status of a job; `None` for unknown ids.
    pub async fn status(&self, job_id: &str) -> Result<Option<JobStatus>> {
        Ok(self.repo.get(job_id).await?.map(|job| job.status))
    }

    /// Full job record; `None` for unknown ids.
    pub async fn get(&self, job_id: &str) -> Result<Option<JobRecord>> {
        self.repo.get(job_id).await
    }

    /// Delete terminal jobs that finished more than `older_than` ago.
    pub async fn purge_finished(&self, older_than: Duration) -> Result<u64> {
        let age = chrono::Duration::from_std(older_than)
            .map_err(|e| Error::Validation(format!("retention out of range: {e}")))?;
        let cutoff = chrono::Utc::now() - age;
        let purged = self.repo.purge_finished(cutoff).await?;
        if purged > 0 {
            info!(
                subsystem = "jobs",
                component = "scheduler",
                op = "purge",
                purged,
                "Purged finished jobs"
            );
        }
        Ok(purged)
    }

    /// Fail every job still marked `running`.
    ///
    /// Run at startup, before any work is submitted, to settle jobs whose
    /// process stopped mid-run, and again once the server has stopped.
    pub async fn fail_interrupted(&self) -> Result<u64> {
        let failed = self
            .repo
            .fail_running(defaults::JOB_INTERRUPTED_MESSAGE)
            .await?;
        if failed > 0 {
            warn!(
                subsystem = "jobs",
                component = "scheduler",
                op = "fail_interrupted",
                failed,
                "Failed jobs interrupted by shutdown"
            );
        }
        Ok(failed)
    }

    /// Spawn a loop that purges finished jobs older than `retention` every
    /// `interval`.
    pub fn start_retention_sweep(&self, retention: Duration, interval: Duration) -> JoinHandle<()> {
        let scheduler = self.clone();
        info!(
            subsystem = "jobs",
            component = "scheduler",
            retention_secs = retention.as_secs(),
            interval_secs = interval.as_secs(),
            "Job retention sweep started"
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
            loop {
                ticker.tick().await;
                if let Err(e) = scheduler.purge_finished(retention).await {
                    error!(error = %e, "Failed to purge finished jobs");
                }
            }
        })
    }
}

enum Outcome {
    Complete,
    Failed(String),
}

/// Everything a spawned job needs, detached from the scheduler handle.
struct JobRunner {
    repo: Arc<dyn JobRepository>,
    permits: Arc<Semaphore>,
    event_tx: broadcast::Sender<JobEvent>,
    job_id: String,
    job_type: JobType,
    enabled: bool,
}

impl JobRunner {
    async fn record_and_run<F, Fut>(self, work: F, recorded: oneshot::Sender<Result<()>>)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if let Err(e) = self.repo.create(&self.job_id, self.job_type).await {
            let _ = recorded.send(Err(e));
            return;
        }
        let _ = self.event_tx.send(JobEvent::Submitted {
            job_id: self.job_id.clone(),
            job_type: self.job_type,
        });
        debug!(job_id = %self.job_id, "Job recorded");

        if !self.enabled {
            warn!(job_id = %self.job_id, "Job execution is disabled, failing job");
            self.finish(
                Outcome::Failed("job execution is disabled".into()),
                Duration::ZERO,
            )
            .await;
            let _ = recorded.send(Ok(()));
            return;
        }

        let _ = recorded.send(Ok(()));
        self.run(work).await;
    }

    async fn run<F, Fut>(&self, work: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        // The semaphore is never closed.
        let _permit = self.permits.clone().acquire_owned().await.ok();
        let start = Instant::now();
        info!(
            subsystem = "jobs",
            job_id = %self.job_id,
            job_type = %self.job_type,
            "Processing job"
        );

        let outcome = match AssertUnwindSafe(async move { work().await })
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => Outcome::Complete,
            Ok(Err(e)) => Outcome::Failed(e.to_string()),
            Err(panic) => Outcome::Failed(format!("job panicked: {}", panic_message(&*panic))),
        };

        self.finish(outcome, start.elapsed()).await;
    }

    async fn finish(&self, outcome: Outcome, elapsed: Duration) {
        let job_id = self.job_id.as_str();
        let job_type = self.job_type;
        let duration_ms = elapsed.as_millis() as u64;
        let (status, error) = match &outcome {
            Outcome::Complete => (JobStatus::Complete, None),
            Outcome::Failed(message) => (JobStatus::Failed, Some(message.as_str())),
        };

        match record_outcome(self.repo.as_ref(), job_id, status, error).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(job_id, %status, "Job was not running, terminal status not applied");
                return;
            }
            Err(e) => {
                error!(
                    error = %e,
                    job_id,
                    %status,
                    attempts = defaults::JOB_FINISH_ATTEMPTS,
                    "Failed to record job outcome"
                );
                let _ = self.event_tx.send(JobEvent::Failed {
                    job_id: job_id.to_string(),
                    job_type,
                    error: format!("failed to record job outcome ({status}): {e}"),
                });
                return;
            }
        }

        match outcome {
            Outcome::Complete => {
                info!(job_id, %job_type, duration_ms, "Job completed successfully");
                let _ = self.event_tx.send(JobEvent::Completed {
                    job_id: job_id.to_string(),
                    job_type,
                    duration_ms,
                });
            }
            Outcome::Failed(error) => {
                warn!(job_id, %job_type, %error, duration_ms, "Job failed");
                let _ = self.event_tx.send(JobEvent::Failed {
                    job_id: job_id.to_string(),
                    job_type,
                    error,
                });
            }
        }
    }
}

/// Write a terminal status, retrying storage errors with doubling backoff.
async fn record_outcome(
    repo: &dyn JobRepository,
    job_id: &str,
    status: JobStatus,
    error: Option<&str>,
) -> Result<bool> {
    let mut delay = Duration::from_millis(defaults::JOB_FINISH_BACKOFF_MS);
    let mut attempt = 1;
    loop {
        match repo.finish(job_id, status, error).await {
            Ok(applied) => return Ok(applied),
            Err(e) if attempt < defaults::JOB_FINISH_ATTEMPTS => {
                warn!(error = %e, job_id, attempt, "Recording job outcome failed, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

//! Worker loop: pop, resolve, execute, repeat.
//!
//! A worker drains its lanes one job at a time. Parallelism comes from running
//! more worker processes against the same backend, not from inside the loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backend::{QueueBackend, QueueError};
use crate::config::WorkerProfile;
use crate::job::{JobContext, JobRecord};
use crate::registry::JobRegistry;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Lanes polled in priority order on every iteration
    pub lanes: Vec<String>,
    pub idle_sleep: Duration,
    pub error_sleep: Duration,
    /// Per-job execution limit; `None` lets handlers run unbounded
    pub job_timeout: Option<Duration>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            lanes: vec![crate::job::DEFAULT_LANE.to_string()],
            idle_sleep: Duration::from_secs(3),
            error_sleep: Duration::from_secs(5),
            job_timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl From<&WorkerProfile> for WorkerConfig {
    fn from(profile: &WorkerProfile) -> Self {
        Self {
            lanes: profile.lanes.clone(),
            idle_sleep: profile.idle_sleep(),
            error_sleep: profile.error_sleep(),
            job_timeout: profile.timeout(),
        }
    }
}

/// Outcome of one loop iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// No lane had a ready job
    Idle,
    /// No job was found and at least one lane could not be popped
    Unavailable,
    /// Job ran to completion
    Processed { job_id: crate::job::JobId },
    /// No handler for the job type; the job is gone
    Dropped { job_type: String },
    /// Handler returned an error or exceeded the timeout
    Failed { job_id: crate::job::JobId },
}

/// Counters since the worker started
#[derive(Debug, Default)]
pub struct WorkerStats {
    pub processed: AtomicU64,
    pub failed: AtomicU64,
    pub dropped: AtomicU64,
    pub idle_polls: AtomicU64,
}

impl WorkerStats {
    fn record(&self, tick: &Tick) {
        let counter = match tick {
            Tick::Idle | Tick::Unavailable => &self.idle_polls,
            Tick::Processed { .. } => &self.processed,
            Tick::Dropped { .. } => &self.dropped,
            Tick::Failed { .. } => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct Worker {
    backend: Arc<dyn QueueBackend>,
    registry: Arc<JobRegistry>,
    config: WorkerConfig,
    stats: Arc<WorkerStats>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish()
    }
}

impl Worker {
    pub fn new(
        backend: Arc<dyn QueueBackend>,
        registry: Arc<JobRegistry>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            backend,
            registry,
            config,
            stats: Arc::new(WorkerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        self.stats.clone()
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            backend = self.backend.name(),
            lanes = ?self.config.lanes,
            "Queue worker started"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let tick = self.run_once_with(&shutdown).await;
            let pause = match tick {
                Tick::Idle => self.config.idle_sleep,
                Tick::Unavailable | Tick::Failed { .. } => self.config.error_sleep,
                Tick::Processed { .. } | Tick::Dropped { .. } => continue,
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        info!(
            processed = self.stats.processed.load(Ordering::Relaxed),
            failed = self.stats.failed.load(Ordering::Relaxed),
            dropped = self.stats.dropped.load(Ordering::Relaxed),
            "Queue worker stopped"
        );
    }

    /// One iteration without sleeping afterwards
    pub async fn run_once(&self) -> Tick {
        self.run_once_with(&CancellationToken::new()).await
    }

    async fn run_once_with(&self, shutdown: &CancellationToken) -> Tick {
        let tick = match self.next_job().await {
            Ok(Some(record)) => self.execute(record, shutdown).await,
            Ok(None) => Tick::Idle,
            Err(_) => Tick::Unavailable,
        };
        self.stats.record(&tick);
        tick
    }

    /// First ready job across the lanes, in priority order. A failing lane
    /// does not stop the others; the error is returned only when no lane
    /// produced a job.
    async fn next_job(&self) -> Result<Option<JobRecord>, QueueError> {
        let mut failure = None;
        for lane in &self.config.lanes {
            match self.backend.pop(lane).await {
                Ok(Some(record)) => return Ok(Some(record)),
                Ok(None) => {}
                Err(e) => {
                    warn!(lane = %lane, error = %e, "Failed to pop job");
                    failure = Some(e);
                }
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    async fn execute(&self, record: JobRecord, shutdown: &CancellationToken) -> Tick {
        let Some(handler) = self.registry.resolve(&record.job_type) else {
            warn!(
                job_id = %record.id,
                job_type = %record.job_type,
                lane = %record.lane,
                "No handler registered for job type, dropping job"
            );
            return Tick::Dropped {
                job_type: record.job_type,
            };
        };

        info!(job_id = %record.id, job_type = %record.job_type, lane = %record.lane, "Processing job");

        let cancellation = shutdown.child_token();
        let ctx = JobContext::for_record(&record, cancellation.clone());
        let started = Instant::now();

        let result = match self.config.job_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, handler.handle(&record.payload, ctx)).await {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(_) => {
                        cancellation.cancel();
                        Err(timeout_message(limit))
                    }
                }
            }
            None => handler
                .handle(&record.payload, ctx)
                .await
                .map_err(|e| e.to_string()),
        };

        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                info!(job_id = %record.id, duration_ms, "Job completed");
                Tick::Processed { job_id: record.id }
            }
            Err(message) => {
                error!(
                    job_id = %record.id,
                    job_type = %record.job_type,
                    attempts = record.attempts,
                    duration_ms,
                    error = %message,
                    "Job failed"
                );
                Tick::Failed { job_id: record.id }
            }
        }
    }
}

fn timeout_message(limit: Duration) -> String {
    format!("timed out after {limit:?}")
}

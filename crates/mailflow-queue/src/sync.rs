//! Synchronous backend: runs the handler inside `push`.
//!
//! Nothing is ever stored, so `pop` always returns `None` and `size` is always
//! zero. `push_delayed` suspends the caller for the whole delay before running
//! the job. Meant for tests and single-process deployments only; producers on
//! this backend pay the full execution cost of every job they enqueue.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::{QueueBackend, QueueError};
use crate::clock::{system_clock, SharedClock};
use crate::job::{JobContext, JobId, JobRecord, Payload};
use crate::registry::JobRegistry;

#[derive(Debug)]
pub struct SyncQueue {
    registry: Arc<JobRegistry>,
    clock: SharedClock,
}

impl SyncQueue {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self {
            registry,
            clock: system_clock(),
        }
    }

    async fn execute(&self, record: JobRecord) -> Result<JobId, QueueError> {
        let handler = self
            .registry
            .resolve(&record.job_type)
            .ok_or_else(|| QueueError::UnknownJobType(record.job_type.clone()))?;

        let started = Instant::now();
        let ctx = JobContext::for_record(&record, CancellationToken::new());

        handler
            .handle(&record.payload, ctx)
            .await
            .map_err(|e| QueueError::Handler {
                job_type: record.job_type.clone(),
                message: e.to_string(),
            })?;

        info!(
            job_id = %record.id,
            job_type = %record.job_type,
            duration_ms = started.elapsed().as_millis() as u64,
            "Job executed inline"
        );
        Ok(record.id)
    }
}

#[async_trait]
impl QueueBackend for SyncQueue {
    fn name(&self) -> &str {
        "sync"
    }

    async fn push(
        &self,
        job_type: &str,
        payload: Payload,
        lane: &str,
    ) -> Result<JobId, QueueError> {
        let now = self.clock.now();
        self.execute(JobRecord::new(job_type, payload, lane, now, None))
            .await
    }

    async fn push_delayed(
        &self,
        job_type: &str,
        payload: Payload,
        delay: Duration,
        lane: &str,
    ) -> Result<JobId, QueueError> {
        if !delay.is_zero() {
            debug!(job_type, delay_secs = delay.as_secs(), "Delaying inline job");
            tokio::time::sleep(delay).await;
        }
        self.push(job_type, payload, lane).await
    }

    async fn pop(&self, _lane: &str) -> Result<Option<JobRecord>, QueueError> {
        Ok(None)
    }

    async fn size(&self, _lane: &str) -> Result<u64, QueueError> {
        Ok(0)
    }

    async fn clear(&self, _lane: &str) -> Result<(), QueueError> {
        Ok(())
    }
}

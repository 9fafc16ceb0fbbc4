//! Queue Backend Trait

use crate::job::{JobId, JobRecord, Payload};
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Requested connection is not configured or its settings are unusable
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The underlying store could not be reached or rejected the command
    #[error("Connectivity error: {0}")]
    Connectivity(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Inline execution failed (synchronous backend only)
    #[error("Job {job_type} failed: {message}")]
    Handler { job_type: String, message: String },
    /// No handler registered for the job type (synchronous backend only)
    #[error("No handler registered for job type: {0}")]
    UnknownJobType(String),
}

#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Short driver name used in logs
    fn name(&self) -> &str;

    /// Store a job that is available immediately
    async fn push(&self, job_type: &str, payload: Payload, lane: &str)
        -> Result<JobId, QueueError>;

    /// Store a job that becomes available once `delay` has elapsed
    async fn push_delayed(
        &self,
        job_type: &str,
        payload: Payload,
        delay: Duration,
        lane: &str,
    ) -> Result<JobId, QueueError>;

    /// Remove and return the oldest ready job of the lane, promoting due
    /// delayed jobs first
    async fn pop(&self, lane: &str) -> Result<Option<JobRecord>, QueueError>;

    /// Number of ready jobs in the lane
    async fn size(&self, lane: &str) -> Result<u64, QueueError>;

    /// Drop every job of the lane, ready and delayed
    async fn clear(&self, lane: &str) -> Result<(), QueueError>;
}

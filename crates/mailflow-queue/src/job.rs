//! Job definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Job Identifier
pub type JobId = Uuid;

/// Job payload: string keys to arbitrary JSON values, insertion order preserved.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Error type returned by job handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Lane used when a producer does not name one
pub const DEFAULT_LANE: &str = "default";

/// A unit of deferred work as stored by a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub job_type: String,
    pub payload: Payload,
    pub lane: String,
    pub attempts: u32,
    /// Not poppable before this instant. `None` means immediately available.
    pub available_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl JobRecord {
    /// Build a fresh record with a new id and zero attempts.
    pub fn new(
        job_type: &str,
        payload: Payload,
        lane: &str,
        created_at: DateTime<Utc>,
        available_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type: job_type.to_string(),
            payload,
            lane: lane.to_string(),
            attempts: 0,
            available_at,
            created_at,
        }
    }

    /// Whether the record may be handed out at `now`.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.available_at.map_or(true, |at| at <= now)
    }
}

/// Execution context handed to a handler alongside the payload
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub job_type: String,
    pub lane: String,
    pub attempts: u32,
    /// Cancelled when the lane timeout expires or the worker shuts down.
    /// Long-running handlers should check it between steps.
    pub cancellation: CancellationToken,
}

impl JobContext {
    pub fn for_record(record: &JobRecord, cancellation: CancellationToken) -> Self {
        Self {
            job_id: record.id,
            job_type: record.job_type.clone(),
            lane: record.lane.clone(),
            attempts: record.attempts,
            cancellation,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Executes the payload of one job type
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync + Debug {
    async fn handle(&self, payload: &Payload, ctx: JobContext) -> Result<(), HandlerError>;
}

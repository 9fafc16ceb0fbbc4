//! List-backed queue: a ready list per lane plus a score-ordered set of
//! delayed entries, in the style of a Redis work queue.
//!
//! Ready entries are pushed on the left and popped from the right, so each
//! lane drains oldest-first. Delayed entries are scored by their
//! `available_at` in unix milliseconds and moved onto the ready list once due;
//! the move happens at the start of every `pop` and `size`.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::{QueueBackend, QueueError};
use crate::clock::{system_clock, SharedClock};
use crate::job::{JobId, JobRecord, Payload};

/// Key prefix used when a connection does not configure one
pub const DEFAULT_PREFIX: &str = "mailflow:queue:";

/// Atomic list / sorted-set primitives the list-backed queue is built on.
///
/// Every method must be atomic with respect to concurrent callers sharing the
/// same store: two `pop_ready` calls never return the same entry, and
/// `promote_due` never moves an entry twice.
#[async_trait]
pub trait ListStore: Send + Sync {
    /// Driver name reported by the queue
    fn driver(&self) -> &'static str;

    /// Push an entry on the left of the ready list
    async fn push_ready(&self, key: &str, entry: String) -> Result<(), QueueError>;

    /// Add an entry to the delayed set with the given score
    async fn schedule(&self, key: &str, score_ms: i64, entry: String) -> Result<(), QueueError>;

    /// Move every delayed entry with `score <= now_ms` onto the left of the
    /// ready list in ascending score order; returns how many moved
    async fn promote_due(
        &self,
        delayed_key: &str,
        ready_key: &str,
        now_ms: i64,
    ) -> Result<usize, QueueError>;

    /// Pop from the right of the ready list
    async fn pop_ready(&self, key: &str) -> Result<Option<String>, QueueError>;

    /// Length of the ready list
    async fn ready_len(&self, key: &str) -> Result<u64, QueueError>;

    /// Remove the given keys entirely
    async fn delete(&self, keys: &[String]) -> Result<(), QueueError>;
}

/// Queue backend over any [`ListStore`]
#[derive(Debug)]
pub struct ListQueue<S> {
    store: S,
    prefix: String,
    clock: SharedClock,
}

impl<S: ListStore> ListQueue<S> {
    pub fn new(store: S, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            clock: system_clock(),
        }
    }

    /// Replace the time source (tests use a manual clock)
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn ready_key(&self, lane: &str) -> String {
        format!("{}{}", self.prefix, lane)
    }

    fn delayed_key(&self, lane: &str) -> String {
        format!("{}delayed:{}", self.prefix, lane)
    }

    async fn promote(&self, lane: &str) -> Result<(), QueueError> {
        let now_ms = self.clock.now().timestamp_millis();
        let moved = self
            .store
            .promote_due(&self.delayed_key(lane), &self.ready_key(lane), now_ms)
            .await?;

        if moved > 0 {
            debug!(lane, moved, "Promoted delayed jobs");
        }
        Ok(())
    }
}

#[async_trait]
impl<S: ListStore> QueueBackend for ListQueue<S> {
    fn name(&self) -> &str {
        self.store.driver()
    }

    async fn push(
        &self,
        job_type: &str,
        payload: Payload,
        lane: &str,
    ) -> Result<JobId, QueueError> {
        let now = self.clock.now();
        let record = JobRecord::new(job_type, payload, lane, now, Some(now));
        let entry = serde_json::to_string(&record)?;

        self.store.push_ready(&self.ready_key(lane), entry).await?;
        Ok(record.id)
    }

    async fn push_delayed(
        &self,
        job_type: &str,
        payload: Payload,
        delay: Duration,
        lane: &str,
    ) -> Result<JobId, QueueError> {
        if delay.is_zero() {
            return self.push(job_type, payload, lane).await;
        }

        let now = self.clock.now();
        let available_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .ok_or_else(|| QueueError::Configuration(format!("delay {delay:?} out of range")))?;

        let record = JobRecord::new(job_type, payload, lane, now, Some(available_at));
        let entry = serde_json::to_string(&record)?;

        self.store
            .schedule(
                &self.delayed_key(lane),
                available_at.timestamp_millis(),
                entry,
            )
            .await?;
        Ok(record.id)
    }

    async fn pop(&self, lane: &str) -> Result<Option<JobRecord>, QueueError> {
        self.promote(lane).await?;

        let Some(entry) = self.store.pop_ready(&self.ready_key(lane)).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<JobRecord>(&entry) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(lane, error = %e, "Discarding undecodable queue entry");
                Err(e.into())
            }
        }
    }

    async fn size(&self, lane: &str) -> Result<u64, QueueError> {
        self.promote(lane).await?;
        self.store.ready_len(&self.ready_key(lane)).await
    }

    async fn clear(&self, lane: &str) -> Result<(), QueueError> {
        self.store
            .delete(&[self.ready_key(lane), self.delayed_key(lane)])
            .await
    }
}

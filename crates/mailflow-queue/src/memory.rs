//! In-memory list store, for single-process deployments and tests

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tokio::sync::Mutex;

use crate::backend::QueueError;
use crate::list::{ListQueue, ListStore, DEFAULT_PREFIX};

#[derive(Debug, Default)]
struct Lists {
    ready: HashMap<String, VecDeque<String>>,
    /// Keyed by (score, insertion sequence) so equal scores keep push order
    delayed: HashMap<String, BTreeMap<(i64, u64), String>>,
    seq: u64,
}

/// Process-local [`ListStore`]. A single lock guards all keys, which makes
/// every operation atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    lists: Mutex<Lists>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of delayed entries waiting under `key`
    pub async fn delayed_len(&self, key: &str) -> usize {
        self.lists
            .lock()
            .await
            .delayed
            .get(key)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl ListStore for MemoryStore {
    fn driver(&self) -> &'static str {
        "memory"
    }

    async fn push_ready(&self, key: &str, entry: String) -> Result<(), QueueError> {
        let mut lists = self.lists.lock().await;
        lists.ready.entry(key.to_string()).or_default().push_front(entry);
        Ok(())
    }

    async fn schedule(&self, key: &str, score_ms: i64, entry: String) -> Result<(), QueueError> {
        let mut lists = self.lists.lock().await;
        lists.seq += 1;
        let seq = lists.seq;
        lists
            .delayed
            .entry(key.to_string())
            .or_default()
            .insert((score_ms, seq), entry);
        Ok(())
    }

    async fn promote_due(
        &self,
        delayed_key: &str,
        ready_key: &str,
        now_ms: i64,
    ) -> Result<usize, QueueError> {
        let mut lists = self.lists.lock().await;

        let due = match lists.delayed.get_mut(delayed_key) {
            Some(set) => {
                let not_due = set.split_off(&(now_ms.saturating_add(1), 0));
                std::mem::replace(set, not_due)
            }
            None => return Ok(0),
        };

        if lists.delayed.get(delayed_key).is_some_and(BTreeMap::is_empty) {
            lists.delayed.remove(delayed_key);
        }

        let moved = due.len();
        if moved > 0 {
            let ready = lists.ready.entry(ready_key.to_string()).or_default();
            for entry in due.into_values() {
                ready.push_front(entry);
            }
        }
        Ok(moved)
    }

    async fn pop_ready(&self, key: &str) -> Result<Option<String>, QueueError> {
        let mut lists = self.lists.lock().await;
        let Some(list) = lists.ready.get_mut(key) else {
            return Ok(None);
        };
        let entry = list.pop_back();
        if list.is_empty() {
            lists.ready.remove(key);
        }
        Ok(entry)
    }

    async fn ready_len(&self, key: &str) -> Result<u64, QueueError> {
        let lists = self.lists.lock().await;
        Ok(lists.ready.get(key).map_or(0, |l| l.len() as u64))
    }

    async fn delete(&self, keys: &[String]) -> Result<(), QueueError> {
        let mut lists = self.lists.lock().await;
        for key in keys {
            lists.ready.remove(key);
            lists.delayed.remove(key);
        }
        Ok(())
    }
}

/// List-backed queue held entirely in process memory
pub type MemoryQueue = ListQueue<MemoryStore>;

impl Default for ListQueue<MemoryStore> {
    fn default() -> Self {
        ListQueue::new(MemoryStore::new(), DEFAULT_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::QueueBackend;
    use crate::clock::ManualClock;
    use crate::job::Payload;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_push_pop_round_trip() {
        let queue = MemoryQueue::default();

        let id = queue
            .push("SendEmailJob", payload(json!({ "email_id": 42 })), "email")
            .await
            .unwrap();
        assert_eq!(queue.size("email").await.unwrap(), 1);

        let job = queue.pop("email").await.unwrap().expect("Should have job");
        assert_eq!(job.id, id);
        assert_eq!(job.job_type, "SendEmailJob");
        assert_eq!(job.payload, payload(json!({ "email_id": 42 })));
        assert_eq!(job.lane, "email");
        assert_eq!(job.attempts, 0);

        assert_eq!(queue.size("email").await.unwrap(), 0);
        assert!(queue.pop("email").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delayed_job_promotion() {
        let clock = ManualClock::default();
        let queue = MemoryQueue::default().with_clock(Arc::new(clock.clone()));

        let id = queue
            .push_delayed("CleanupJob", Payload::new(), Duration::from_secs(5), "default")
            .await
            .unwrap();

        assert!(queue.pop("default").await.unwrap().is_none());
        assert_eq!(queue.size("default").await.unwrap(), 0);

        clock.advance(Duration::from_secs(4));
        assert!(queue.pop("default").await.unwrap().is_none());

        clock.advance(Duration::from_secs(1));
        let job = queue
            .pop("default")
            .await
            .unwrap()
            .expect("Should have delayed job");
        assert_eq!(job.id, id);
        assert_eq!(job.job_type, "CleanupJob");
    }

    #[tokio::test]
    async fn test_promoted_jobs_keep_due_order() {
        let clock = ManualClock::default();
        let queue = MemoryQueue::default().with_clock(Arc::new(clock.clone()));

        let later = queue
            .push_delayed("Later", Payload::new(), Duration::from_secs(20), "default")
            .await
            .unwrap();
        let sooner = queue
            .push_delayed("Sooner", Payload::new(), Duration::from_secs(10), "default")
            .await
            .unwrap();

        clock.advance(Duration::from_secs(30));
        assert_eq!(queue.size("default").await.unwrap(), 2);
        assert_eq!(queue.pop("default").await.unwrap().unwrap().id, sooner);
        assert_eq!(queue.pop("default").await.unwrap().unwrap().id, later);
    }

    #[tokio::test]
    async fn test_zero_delay_is_immediate() {
        let queue = MemoryQueue::default();
        queue
            .push_delayed("Now", Payload::new(), Duration::ZERO, "default")
            .await
            .unwrap();
        assert_eq!(queue.size("default").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clear_drops_ready_and_delayed() {
        let queue = MemoryQueue::default();
        queue.push("A", Payload::new(), "reports").await.unwrap();
        queue
            .push_delayed("B", Payload::new(), Duration::from_secs(60), "reports")
            .await
            .unwrap();

        queue.clear("reports").await.unwrap();

        assert_eq!(queue.size("reports").await.unwrap(), 0);
        assert!(queue.pop("reports").await.unwrap().is_none());
        assert_eq!(queue.store().delayed_len("mailflow:queue:delayed:reports").await, 0);
    }

    #[tokio::test]
    async fn test_lanes_are_independent() {
        let queue = MemoryQueue::default();
        queue.push("A", Payload::new(), "email").await.unwrap();
        queue.push("B", Payload::new(), "backup").await.unwrap();

        queue.clear("email").await.unwrap();

        assert_eq!(queue.size("email").await.unwrap(), 0);
        assert_eq!(queue.size("backup").await.unwrap(), 1);
        assert_eq!(queue.pop("backup").await.unwrap().unwrap().job_type, "B");
    }
}

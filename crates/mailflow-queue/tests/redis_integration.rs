#![cfg(feature = "redis")]
//! Requires a running Redis server: `REDIS_URL=redis://127.0.0.1:6379/15 cargo test -- --ignored`

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use mailflow_queue::clock::ManualClock;
use mailflow_queue::redis_store::RedisQueue;
use mailflow_queue::{Payload, QueueBackend};

async fn queue(prefix: &str) -> RedisQueue {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/15".to_string());
    let prefix = format!("mailflow:test:{prefix}:{}:", uuid::Uuid::new_v4());
    RedisQueue::connect(&url, &prefix).await.expect("redis available")
}

#[tokio::test]
#[ignore]
async fn test_redis_push_pop_fifo() {
    let queue = queue("fifo").await;

    let mut payload = Payload::new();
    payload.insert("email_id".into(), json!(42));
    let first = queue.push("SendEmailJob", payload, "email").await.unwrap();
    let second = queue.push("SendEmailJob", Payload::new(), "email").await.unwrap();

    assert_eq!(queue.size("email").await.unwrap(), 2);

    let job = queue.pop("email").await.unwrap().unwrap();
    assert_eq!(job.id, first);
    assert_eq!(job.payload["email_id"], json!(42));
    assert_eq!(queue.pop("email").await.unwrap().unwrap().id, second);
    assert!(queue.pop("email").await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_redis_delayed_promotion() {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap());
    let queue = queue("delayed").await.with_clock(Arc::new(clock.clone()));

    let id = queue
        .push_delayed("SendDailyDigestJob", Payload::new(), Duration::from_secs(60), "email")
        .await
        .unwrap();
    assert!(queue.pop("email").await.unwrap().is_none());

    clock.advance(Duration::from_secs(60));
    assert_eq!(queue.pop("email").await.unwrap().unwrap().id, id);

    queue
        .push_delayed("SendDailyDigestJob", Payload::new(), Duration::from_secs(60), "email")
        .await
        .unwrap();
    queue.clear("email").await.unwrap();
    clock.advance(Duration::from_secs(120));
    assert_eq!(queue.size("email").await.unwrap(), 0);
}

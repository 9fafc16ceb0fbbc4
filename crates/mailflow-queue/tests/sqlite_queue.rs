#![cfg(feature = "sqlite")]

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use mailflow_queue::clock::ManualClock;
use mailflow_queue::database::DatabaseQueue;
use mailflow_queue::{Payload, QueueBackend};

type TestResult = Result<(), Box<dyn std::error::Error>>;

async fn memory_queue() -> Result<DatabaseQueue, Box<dyn std::error::Error>> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    Ok(DatabaseQueue::new(pool, "queue_jobs").await?)
}

fn payload(email_id: i64) -> Payload {
    let mut payload = Payload::new();
    payload.insert("email_id".into(), json!(email_id));
    payload
}

#[tokio::test]
async fn test_push_pop_is_fifo_within_lane() -> TestResult {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap());
    let queue = memory_queue().await?.with_clock(Arc::new(clock.clone()));

    // Same created_at for both rows; insertion order breaks the tie
    let first = queue.push("SendEmailJob", payload(1), "email").await?;
    let second = queue.push("SendEmailJob", payload(2), "email").await?;

    assert_eq!(queue.size("email").await?, 2);

    let job = queue.pop("email").await?.expect("first job");
    assert_eq!(job.id, first);
    assert_eq!(job.payload["email_id"], json!(1));
    assert_eq!(job.lane, "email");
    assert_eq!(job.attempts, 0);

    let job = queue.pop("email").await?.expect("second job");
    assert_eq!(job.id, second);

    assert!(queue.pop("email").await?.is_none());
    assert_eq!(queue.size("email").await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_delayed_job_becomes_visible_after_delay() -> TestResult {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap());
    let queue = memory_queue().await?.with_clock(Arc::new(clock.clone()));

    let id = queue
        .push_delayed("SendDailyDigestJob", Payload::new(), Duration::from_secs(60), "email")
        .await?;

    assert!(queue.pop("email").await?.is_none());
    assert_eq!(queue.size("email").await?, 0);

    clock.advance(Duration::from_secs(59));
    assert!(queue.pop("email").await?.is_none());

    clock.advance(Duration::from_secs(1));
    assert_eq!(queue.size("email").await?, 1);
    let job = queue.pop("email").await?.expect("delayed job is due");
    assert_eq!(job.id, id);
    Ok(())
}

#[tokio::test]
async fn test_clear_only_touches_one_lane() -> TestResult {
    let queue = memory_queue().await?;

    queue.push("DatabaseBackupJob", Payload::new(), "backup").await?;
    queue
        .push_delayed("DatabaseBackupJob", Payload::new(), Duration::from_secs(3600), "backup")
        .await?;
    queue.push("CleanupTempFilesJob", Payload::new(), "default").await?;

    queue.clear("backup").await?;

    assert!(queue.pop("backup").await?.is_none());
    assert_eq!(queue.size("default").await?, 1);

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_jobs WHERE queue = 'backup'")
        .fetch_one(queue.pool())
        .await?;
    assert_eq!(remaining, 0, "delayed rows are cleared too");
    Ok(())
}

#[tokio::test]
async fn test_concurrent_pops_never_share_a_job() -> TestResult {
    let dir = tempfile::tempdir()?;
    let url = format!("sqlite:{}?mode=rwc", dir.path().join("queue.db").display());
    let queue = Arc::new(DatabaseQueue::connect(&url, "queue_jobs", 4).await?);

    let mut pushed = HashSet::new();
    for i in 0..40 {
        pushed.insert(queue.push("SendEmailJob", payload(i), "email").await?);
    }

    let mut workers = Vec::new();
    for _ in 0..4 {
        let queue = queue.clone();
        workers.push(tokio::spawn(async move {
            let mut popped = Vec::new();
            while let Some(job) = queue.pop("email").await.expect("pop") {
                popped.push(job.id);
            }
            popped
        }));
    }

    let mut seen = HashSet::new();
    for worker in workers {
        for id in worker.await? {
            assert!(seen.insert(id), "job {id} popped twice");
        }
    }
    assert_eq!(seen, pushed);
    Ok(())
}

#[tokio::test]
async fn test_connect_creates_schema() -> TestResult {
    let queue = DatabaseQueue::connect("sqlite::memory:", "mail_jobs", 5).await?;
    queue.push("ArchiveOldEmailsJob", Payload::new(), "default").await?;
    assert_eq!(queue.size("default").await?, 1);
    assert_eq!(queue.name(), "database");
    Ok(())
}

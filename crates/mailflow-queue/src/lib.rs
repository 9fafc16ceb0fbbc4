//! # MailFlow Queue
//!
//! Background job pipeline for the MailFlow platform.
//!
//! Features:
//! - One `QueueBackend` contract over list (memory, Redis), relational (SQLite)
//!   and synchronous-inline storage
//! - Named connections built lazily by the `QueueManager`
//! - Single-job polling `Worker` with lane priority, idle sleep and error cooldown
//! - Wall-clock `Scheduler` for recurring jobs

pub mod backend;
pub mod clock;
pub mod config;
pub mod job;
pub mod list;
pub mod manager;
pub mod memory;
pub mod registry;
pub mod scheduler;
pub mod sync;
pub mod worker;

#[cfg(feature = "sqlite")]
pub mod database;
#[cfg(feature = "redis")]
pub mod redis_store;

pub use backend::{QueueBackend, QueueError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use crate::config::{ConfigError, ConnectionConfig, QueueConfig, WorkerProfile};
pub use job::{HandlerError, JobContext, JobHandler, JobId, JobRecord, Payload, DEFAULT_LANE};
pub use manager::QueueManager;
pub use memory::{MemoryQueue, MemoryStore};
pub use registry::JobRegistry;
pub use scheduler::{LocalTickClaim, RunReport, Schedule, ScheduledTask, Scheduler, TickClaim, Trigger};
pub use sync::SyncQueue;
pub use worker::{Tick, Worker, WorkerConfig, WorkerStats};

#[cfg(feature = "sqlite")]
pub use database::DatabaseQueue;
#[cfg(feature = "redis")]
pub use redis_store::{RedisQueue, RedisStore};

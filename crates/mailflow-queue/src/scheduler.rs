//! Recurring job scheduler
//!
//! The scheduler has no timer of its own. Something external (cron, a systemd
//! timer) invokes it once per minute; each invocation evaluates the schedule
//! against the wall-clock minute and pushes every due task.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

use crate::backend::{QueueBackend, QueueError};
use crate::job::{JobId, Payload, DEFAULT_LANE};

/// Wall-clock cadence of a recurring task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    EveryMinute,
    EveryFiveMinutes,
    EveryFifteenMinutes,
    /// Minute 0 of every hour
    Hourly,
    DailyAt { hour: u32 },
    WeeklyAt { weekday: Weekday, hour: u32 },
    MonthlyAt { day: u32, hour: u32 },
}

impl Trigger {
    pub fn is_due<T: TimeZone>(&self, at: &DateTime<T>) -> bool {
        let minute = at.minute();
        let hour = at.hour();
        match *self {
            Trigger::EveryMinute => true,
            Trigger::EveryFiveMinutes => minute % 5 == 0,
            Trigger::EveryFifteenMinutes => minute % 15 == 0,
            Trigger::Hourly => minute == 0,
            Trigger::DailyAt { hour: h } => minute == 0 && hour == h,
            Trigger::WeeklyAt { weekday, hour: h } => {
                minute == 0 && hour == h && at.weekday() == weekday
            }
            Trigger::MonthlyAt { day, hour: h } => minute == 0 && hour == h && at.day() == day,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTask {
    pub job_type: String,
    pub payload: Payload,
    pub lane: String,
    pub trigger: Trigger,
}

impl ScheduledTask {
    pub fn new(job_type: &str, lane: &str, trigger: Trigger) -> Self {
        Self {
            job_type: job_type.to_string(),
            payload: Payload::new(),
            lane: lane.to_string(),
            trigger,
        }
    }
}

/// Ordered list of recurring tasks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schedule {
    tasks: Vec<ScheduledTask>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task(mut self, job_type: &str, lane: &str, trigger: Trigger) -> Self {
        self.tasks.push(ScheduledTask::new(job_type, lane, trigger));
        self
    }

    pub fn push(&mut self, task: ScheduledTask) {
        self.tasks.push(task);
    }

    pub fn tasks(&self) -> &[ScheduledTask] {
        &self.tasks
    }

    /// The platform's built-in recurring jobs
    pub fn mailflow() -> Self {
        use Trigger::*;
        const D: &str = DEFAULT_LANE;

        Self::new()
            .task("ProcessEmailQueueJob", "email", EveryMinute)
            .task("CleanupTempFilesJob", D, EveryMinute)
            .task("UpdateSystemStatsJob", D, EveryFiveMinutes)
            .task("ProcessNotificationsJob", D, EveryFiveMinutes)
            .task("CleanupExpiredSessionsJob", D, EveryFifteenMinutes)
            .task("UpdateSearchIndexJob", D, Hourly)
            .task("CleanupOldLogsJob", D, Hourly)
            .task("ProcessEmailDigestJob", D, Hourly)
            .task("DatabaseBackupJob", "backup", DailyAt { hour: 2 })
            .task("CleanupOldAuditLogsJob", D, DailyAt { hour: 2 })
            .task("OptimizeDatabaseJob", D, DailyAt { hour: 2 })
            .task("GenerateDailyReportsJob", "reports", DailyAt { hour: 6 })
            .task("SendDailyDigestJob", "email", DailyAt { hour: 6 })
            .task("GenerateWeeklyReportsJob", "reports", WeeklyAt { weekday: Weekday::Mon, hour: 3 })
            .task("CleanupOldBackupsJob", D, WeeklyAt { weekday: Weekday::Mon, hour: 3 })
            .task("UpdateSecurityScansJob", D, WeeklyAt { weekday: Weekday::Mon, hour: 3 })
            .task("GenerateMonthlyReportsJob", "reports", MonthlyAt { day: 1, hour: 4 })
            .task("ArchiveOldEmailsJob", D, MonthlyAt { day: 1, hour: 4 })
            .task("UpdateLicenseCheckJob", D, MonthlyAt { day: 1, hour: 4 })
    }

    /// Tasks due at the given wall-clock minute, in schedule order
    pub fn due<'a, T: TimeZone>(&'a self, at: &DateTime<T>) -> Vec<&'a ScheduledTask> {
        self.tasks.iter().filter(|t| t.trigger.is_due(at)).collect()
    }
}

/// Per-minute claim guarding against double evaluation
#[async_trait]
pub trait TickClaim: Send + Sync {
    /// `true` when `key` had not been claimed before
    async fn claim(&self, key: &str) -> Result<bool, QueueError>;
}

/// In-process claim; only dedups runs within one process.
///
/// Minute keys only move forward, so the last claimed key is all that is kept.
#[derive(Debug, Default)]
pub struct LocalTickClaim {
    last: Mutex<Option<String>>,
}

impl LocalTickClaim {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TickClaim for LocalTickClaim {
    async fn claim(&self, key: &str) -> Result<bool, QueueError> {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if last.as_deref() == Some(key) {
            return Ok(false);
        }
        *last = Some(key.to_string());
        Ok(true)
    }
}

/// Claim key for a wall-clock minute: `YYYYMMDDHHMM`
pub fn tick_key<T: TimeZone>(at: &DateTime<T>) -> String
where
    T::Offset: std::fmt::Display,
{
    at.format("%Y%m%d%H%M").to_string()
}

/// Outcome of one scheduler invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub enqueued: Vec<(String, JobId)>,
    pub failed: Vec<(String, String)>,
    /// The minute was already claimed; nothing was evaluated
    pub skipped: bool,
}

pub struct Scheduler {
    backend: Arc<dyn QueueBackend>,
    schedule: Schedule,
    timezone: Tz,
    claim: Option<Arc<dyn TickClaim>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("backend", &self.backend.name())
            .field("tasks", &self.schedule.tasks.len())
            .field("timezone", &self.timezone)
            .finish()
    }
}

impl Scheduler {
    pub fn new(backend: Arc<dyn QueueBackend>, schedule: Schedule) -> Self {
        Self {
            backend,
            schedule,
            timezone: Tz::UTC,
            claim: None,
        }
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_claim(mut self, claim: Arc<dyn TickClaim>) -> Self {
        self.claim = Some(claim);
        self
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub async fn run_now(&self) -> RunReport {
        self.run_at(Utc::now()).await
    }

    /// Evaluate the schedule for the minute containing `at`
    pub async fn run_at(&self, at: DateTime<Utc>) -> RunReport {
        let local = at.with_timezone(&self.timezone);
        let mut report = RunReport::default();

        if let Some(claim) = &self.claim {
            let key = tick_key(&local);
            match claim.claim(&key).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(tick = %key, "Scheduler tick already claimed, skipping");
                    report.skipped = true;
                    return report;
                }
                Err(e) => {
                    // Claim store unavailable: run unguarded
                    warn!(tick = %key, error = %e, "Tick claim failed, running anyway");
                }
            }
        }

        for task in self.schedule.due(&local) {
            match self
                .backend
                .push(&task.job_type, task.payload.clone(), &task.lane)
                .await
            {
                Ok(id) => report.enqueued.push((task.job_type.clone(), id)),
                Err(e) => {
                    error!(job_type = %task.job_type, lane = %task.lane, error = %e, "Failed to schedule task");
                    report.failed.push((task.job_type.clone(), e.to_string()));
                }
            }
        }

        info!(
            time = %local.format("%Y-%m-%d %H:%M:%S"),
            enqueued = report.enqueued.len(),
            failed = report.failed.len(),
            "Scheduler completed"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn due_names(at: DateTime<Utc>) -> Vec<String> {
        Schedule::mailflow()
            .due(&at)
            .into_iter()
            .map(|t| t.job_type.clone())
            .collect()
    }

    #[test]
    fn test_off_minute_only_runs_every_minute_jobs() {
        // 2024-03-05 is a Tuesday
        assert_eq!(
            due_names(at(2024, 3, 5, 13, 7)),
            vec!["ProcessEmailQueueJob", "CleanupTempFilesJob"]
        );
    }

    #[test]
    fn test_top_of_hour_includes_hourly_and_quarter_jobs() {
        let names = due_names(at(2024, 3, 5, 13, 0));
        assert!(names.contains(&"UpdateSearchIndexJob".to_string()));
        assert!(names.contains(&"CleanupExpiredSessionsJob".to_string()));
        assert!(names.contains(&"UpdateSystemStatsJob".to_string()));
        assert!(!names.contains(&"DatabaseBackupJob".to_string()));
    }

    #[test]
    fn test_daily_weekly_monthly_gates() {
        // 2024-04-01 is a Monday and the 1st
        let monday_first = at(2024, 4, 1, 3, 0);
        assert!(Trigger::WeeklyAt { weekday: Weekday::Mon, hour: 3 }.is_due(&monday_first));
        assert!(!Trigger::MonthlyAt { day: 1, hour: 4 }.is_due(&monday_first));
        assert!(Trigger::MonthlyAt { day: 1, hour: 4 }.is_due(&at(2024, 4, 1, 4, 0)));
        assert!(!Trigger::DailyAt { hour: 2 }.is_due(&at(2024, 4, 1, 2, 1)));
    }

    #[test]
    fn test_timezone_shifts_evaluation() {
        let tz: Tz = "Europe/Berlin".parse().unwrap();
        // 01:00 UTC in January is 02:00 in Berlin
        let local = at(2024, 1, 10, 1, 0).with_timezone(&tz);
        assert!(Trigger::DailyAt { hour: 2 }.is_due(&local));
        assert_eq!(tick_key(&local), "202401100200");
    }

    #[tokio::test]
    async fn test_local_claim_holds_only_the_latest_minute() {
        let claim = LocalTickClaim::new();
        assert!(claim.claim("202401100200").await.unwrap());
        assert!(!claim.claim("202401100200").await.unwrap());
        assert!(claim.claim("202401100201").await.unwrap());
        assert_eq!(
            claim.last.lock().unwrap().as_deref(),
            Some("202401100201")
        );
        assert!(!claim.claim("202401100201").await.unwrap());
    }
}

//! Built-in job handlers
//!
//! The actual work behind each job type (SMTP delivery, the search index,
//! database dumps) belongs to the web application's services. The handlers
//! here record the hand-off so operators can follow a job through the logs.

use async_trait::async_trait;
use tracing::info;

use mailflow_queue::{HandlerError, JobContext, JobHandler, JobRegistry, Payload};

/// Job types and the service each one is handed to
const HANDOFFS: &[(&str, &str)] = &[
    ("SendEmailJob", "mail transport"),
    ("ProcessEmailQueueJob", "mail transport"),
    ("SendDailyDigestJob", "mail transport"),
    ("ProcessEmailDigestJob", "mail transport"),
    ("ArchiveOldEmailsJob", "mail store"),
    ("UpdateSearchIndexJob", "search index"),
    ("ProcessNotificationsJob", "notifications"),
    ("UpdateSystemStatsJob", "monitoring"),
    ("UpdateSecurityScansJob", "security"),
    ("UpdateLicenseCheckJob", "licensing"),
    ("CleanupTempFilesJob", "maintenance"),
    ("CleanupExpiredSessionsJob", "maintenance"),
    ("CleanupOldLogsJob", "maintenance"),
    ("CleanupOldAuditLogsJob", "maintenance"),
    ("CleanupOldBackupsJob", "backups"),
    ("DatabaseBackupJob", "backups"),
    ("OptimizeDatabaseJob", "database"),
    ("GenerateDailyReportsJob", "reporting"),
    ("GenerateWeeklyReportsJob", "reporting"),
    ("GenerateMonthlyReportsJob", "reporting"),
];

#[derive(Debug)]
struct Handoff {
    service: &'static str,
}

#[async_trait]
impl JobHandler for Handoff {
    async fn handle(&self, payload: &Payload, ctx: JobContext) -> Result<(), HandlerError> {
        let data = serde_json::to_string(payload)?;
        info!(
            job_id = %ctx.job_id,
            job_type = %ctx.job_type,
            lane = %ctx.lane,
            service = self.service,
            payload = %data,
            "Job handed off"
        );
        Ok(())
    }
}

/// Registry with a handler for every built-in job type
pub fn builtin_registry() -> JobRegistry {
    let registry = JobRegistry::new();
    for &(job_type, service) in HANDOFFS {
        registry.register(job_type, Handoff { service });
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailflow_queue::scheduler::Schedule;

    #[test]
    fn test_every_scheduled_job_has_a_handler() {
        let registry = builtin_registry();
        for task in Schedule::mailflow().tasks() {
            assert!(
                registry.resolve(&task.job_type).is_some(),
                "{} has no handler",
                task.job_type
            );
        }
        assert!(registry.resolve("SendEmailJob").is_some());
        assert_eq!(registry.names().len(), HANDOFFS.len());
    }

    #[tokio::test]
    async fn test_handoff_accepts_any_payload() {
        let registry = builtin_registry();
        let handler = registry.resolve("SendEmailJob").unwrap();
        let record = mailflow_queue::JobRecord::new(
            "SendEmailJob",
            Payload::new(),
            "email",
            chrono::Utc::now(),
            None,
        );
        let ctx = JobContext::for_record(&record, tokio_util::sync::CancellationToken::new());
        handler.handle(&record.payload, ctx).await.unwrap();
    }
}

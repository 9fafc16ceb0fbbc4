//! Schedule command - enqueue recurring jobs
//!
//! Usage:
//! ```bash
//! # From cron, once per minute
//! * * * * * mailflow schedule
//!
//! # Replay a specific minute
//! mailflow schedule --at 2024-04-01T03:00:00Z
//!
//! # Keep running and evaluate at every minute boundary
//! mailflow schedule --every-minute
//! ```

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use chrono_tz::Tz;
use clap::Args;
use colored::Colorize;
use std::sync::Arc;
use tracing::info;

use mailflow_queue::{LocalTickClaim, QueueManager, RunReport, Schedule, Scheduler};

/// Arguments for the schedule command
#[derive(Args)]
pub struct ScheduleArgs {
    /// Queue connection (defaults to the configured default)
    #[arg(long)]
    pub connection: Option<String>,

    /// Evaluate this instant (RFC 3339) instead of now
    #[arg(long, conflicts_with = "every_minute")]
    pub at: Option<String>,

    /// Stay in the foreground and evaluate at each minute boundary
    #[arg(long)]
    pub every_minute: bool,
}

/// Run the schedule command
pub async fn run(manager: &QueueManager, args: ScheduleArgs) -> Result<()> {
    let settings = &manager.config().scheduler;
    let timezone: Tz = settings
        .timezone
        .parse()
        .map_err(|e| anyhow!("Invalid scheduler timezone '{}': {e}", settings.timezone))?;

    let backend = super::backend(manager, args.connection.as_deref()).await?;
    let mut scheduler = Scheduler::new(backend, Schedule::mailflow()).with_timezone(timezone);
    if settings.dedup {
        scheduler = scheduler.with_claim(Arc::new(LocalTickClaim::new()));
    }

    if !args.every_minute {
        let at = match args.at {
            Some(at) => DateTime::parse_from_rfc3339(&at)
                .with_context(|| format!("--at must be RFC 3339: {at}"))?
                .with_timezone(&Utc),
            None => Utc::now(),
        };
        print_report(&scheduler.run_at(at).await);
        return Ok(());
    }

    info!(timezone = %timezone, "Scheduler running every minute");
    loop {
        let now = Utc::now();
        let next = now.duration_trunc(TimeDelta::minutes(1))? + TimeDelta::minutes(1);
        let wait = (next - now).to_std().unwrap_or_default();

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => break,
        }

        print_report(&scheduler.run_at(next).await);
    }

    crate::print_success("Scheduler stopped");
    Ok(())
}

fn print_report(report: &RunReport) {
    if report.skipped {
        crate::print_warning("Minute already evaluated, nothing enqueued");
        return;
    }

    for (job_type, id) in &report.enqueued {
        println!("  {} {} {}", "•".cyan(), job_type.green(), id.to_string().dimmed());
    }
    for (job_type, error) in &report.failed {
        crate::print_error(&format!("{job_type}: {error}"));
    }
    println!(
        "{} {} enqueued, {} failed",
        "Scheduler completed:".bold(),
        report.enqueued.len(),
        report.failed.len()
    );
}

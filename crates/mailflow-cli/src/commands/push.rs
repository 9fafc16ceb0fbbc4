//! Push command - enqueue a job by hand
//!
//! Usage:
//! ```bash
//! mailflow push SendEmailJob --data '{"email_id": 42}' --lane email
//! mailflow push GenerateDailyReportsJob --lane reports --delay 300
//! ```

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::time::Duration;

use mailflow_queue::{Payload, QueueManager};

/// Arguments for the push command
#[derive(Args)]
pub struct PushArgs {
    /// Job type name
    pub job: String,

    /// JSON object passed to the handler
    #[arg(long, default_value = "{}")]
    pub data: String,

    /// Target lane
    #[arg(long, default_value = "default")]
    pub lane: String,

    /// Seconds before the job becomes available
    #[arg(long, default_value_t = 0)]
    pub delay: u64,

    /// Queue connection (defaults to the configured default)
    #[arg(long)]
    pub connection: Option<String>,
}

/// Run the push command
pub async fn run(manager: &QueueManager, args: PushArgs) -> Result<()> {
    let payload: Payload = serde_json::from_str(&args.data)
        .with_context(|| format!("--data must be a JSON object: {}", args.data))?;

    let backend = super::backend(manager, args.connection.as_deref()).await?;

    let pushed = if args.delay > 0 {
        backend
            .push_delayed(&args.job, payload, Duration::from_secs(args.delay), &args.lane)
            .await
    } else {
        backend.push(&args.job, payload, &args.lane).await
    };
    let id = pushed.with_context(|| format!("Failed to push '{}'", args.job))?;

    crate::print_success(&format!(
        "Pushed {} onto '{}' ({})",
        args.job.green(),
        args.lane,
        id.to_string().dimmed()
    ));
    if args.delay > 0 {
        println!("  {} available in {}s", "⏱".blue(), args.delay);
    }
    Ok(())
}

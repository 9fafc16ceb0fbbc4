//! Work command - run a queue worker
//!
//! Usage:
//! ```bash
//! mailflow work --profile email
//! mailflow work --lane reports --lane default --connection database
//! ```

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::sync::atomic::Ordering;
use tokio_util::sync::CancellationToken;
use tracing::info;

use mailflow_queue::{QueueManager, Worker, WorkerConfig};

/// Arguments for the work command
#[derive(Args)]
pub struct WorkArgs {
    /// Worker profile from the configuration
    #[arg(long, default_value = "default")]
    pub profile: String,

    /// Lanes to poll in priority order (overrides the profile)
    #[arg(long = "lane")]
    pub lanes: Vec<String>,

    /// Queue connection (defaults to the configured default)
    #[arg(long)]
    pub connection: Option<String>,
}

/// Run the work command
pub async fn run(manager: &QueueManager, args: WorkArgs) -> Result<()> {
    let profile = manager
        .config()
        .worker(&args.profile)
        .with_context(|| format!("Worker profile '{}' not configured", args.profile))?;

    let mut config = WorkerConfig::from(profile);
    if !args.lanes.is_empty() {
        config.lanes = args.lanes;
    }

    let backend = super::backend(manager, args.connection.as_deref()).await?;
    if backend.name() == "sync" {
        crate::print_warning("The sync connection runs jobs at push time; this worker will stay idle");
    }

    println!(
        "{} Worker '{}' polling {} on '{}'",
        "⚙".blue(),
        args.profile.green(),
        config.lanes.join(", ").cyan(),
        backend.name()
    );

    let worker = Worker::new(backend, manager.registry().clone(), config);
    let stats = worker.stats();

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
            }
            shutdown.cancel();
        }
    });

    worker.run(shutdown).await;

    crate::print_success(&format!(
        "Worker stopped: {} processed, {} failed, {} dropped",
        stats.processed.load(Ordering::Relaxed),
        stats.failed.load(Ordering::Relaxed),
        stats.dropped.load(Ordering::Relaxed)
    ));
    Ok(())
}

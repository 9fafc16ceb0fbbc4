//! MailFlow CLI - worker, scheduler and queue administration
//!
//! # Usage
//!
//! ```bash
//! # Drain the email lane
//! mailflow work --profile email
//!
//! # Evaluate recurring jobs for the current minute (run from cron)
//! mailflow schedule
//!
//! # Enqueue a job by hand
//! mailflow push SendEmailJob --data '{"email_id": 42}' --lane email
//!
//! # Lane depths for the admin dashboard
//! mailflow size default email reports backup
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use mailflow_queue::{QueueConfig, QueueManager};

mod commands;
mod jobs;

use commands::{clear, info, push, schedule, size, work};

/// MailFlow background job pipeline
#[derive(Parser)]
#[command(
    name = "mailflow",
    version,
    about = "MailFlow queue worker, scheduler and admin tool",
    long_about = "Runs MailFlow's background job pipeline.\n\n\
                  Workers drain named lanes from the configured queue backend;\n\
                  the scheduler enqueues recurring jobs once per minute."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (defaults to ./mailflow.toml when present)
    #[arg(long, global = true, env = "MAILFLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a worker until interrupted
    #[command(name = "work")]
    Work(work::WorkArgs),

    /// Enqueue the recurring jobs due this minute
    #[command(name = "schedule")]
    Schedule(schedule::ScheduleArgs),

    /// Push a job onto a lane
    #[command(name = "push")]
    Push(push::PushArgs),

    /// Show ready job counts per lane
    #[command(name = "size")]
    Size(size::SizeArgs),

    /// Remove every job from a lane
    #[command(name = "clear")]
    Clear(clear::ClearArgs),

    /// Show configured connections and worker profiles
    #[command(name = "info")]
    Info(info::InfoArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = QueueConfig::load(cli.config.as_deref())?;
    let manager = Arc::new(QueueManager::new(config, Arc::new(jobs::builtin_registry())));

    match cli.command {
        Commands::Work(args) => work::run(&manager, args).await,
        Commands::Schedule(args) => schedule::run(&manager, args).await,
        Commands::Push(args) => push::run(&manager, args).await,
        Commands::Size(args) => size::run(&manager, args).await,
        Commands::Clear(args) => clear::run(&manager, args).await,
        Commands::Info(args) => info::run(&manager, args),
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    // Workers and the scheduler report through logs, so info is the floor
    let filter = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();
}

/// Print a success message with a checkmark
pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

/// Print an error message with an X
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    println!("{} {}", "⚠".yellow().bold(), msg);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_accepts_repeated_lanes() {
        let cli = Cli::try_parse_from([
            "mailflow", "work", "--profile", "email", "--lane", "email", "--lane", "default",
        ])
        .unwrap();

        match cli.command {
            Commands::Work(args) => {
                assert_eq!(args.profile, "email");
                assert_eq!(args.lanes, vec!["email", "default"]);
            }
            _ => panic!("expected work"),
        }
    }

    #[test]
    fn test_push_defaults() {
        let cli = Cli::try_parse_from(["mailflow", "-v", "push", "SendEmailJob"]).unwrap();
        assert_eq!(cli.verbose, 1);

        match cli.command {
            Commands::Push(args) => {
                assert_eq!(args.job, "SendEmailJob");
                assert_eq!(args.data, "{}");
                assert_eq!(args.lane, "default");
                assert_eq!(args.delay, 0);
            }
            _ => panic!("expected push"),
        }
    }

    #[test]
    fn test_clear_requires_lane() {
        assert!(Cli::try_parse_from(["mailflow", "clear"]).is_err());
    }
}

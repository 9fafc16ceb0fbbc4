//! Clear command - drop every job on a lane
//!
//! Usage:
//! ```bash
//! mailflow clear reports --yes
//! ```

use anyhow::{bail, Result};
use clap::Args;

use mailflow_queue::QueueManager;

/// Arguments for the clear command
#[derive(Args)]
pub struct ClearArgs {
    /// Lane to clear, including its delayed jobs
    pub lane: String,

    /// Confirm the deletion
    #[arg(long)]
    pub yes: bool,

    /// Queue connection (defaults to the configured default)
    #[arg(long)]
    pub connection: Option<String>,
}

/// Run the clear command
pub async fn run(manager: &QueueManager, args: ClearArgs) -> Result<()> {
    if !args.yes {
        bail!("Refusing to clear '{}' without --yes", args.lane);
    }

    let backend = super::backend(manager, args.connection.as_deref()).await?;
    backend.clear(&args.lane).await?;

    crate::print_success(&format!("Cleared lane '{}' on '{}'", args.lane, backend.name()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use mailflow_queue::{ConnectionConfig, JobRegistry, Payload, QueueConfig};

    fn manager() -> QueueManager {
        let mut connections = BTreeMap::new();
        connections.insert(
            "memory".to_string(),
            ConnectionConfig::Memory {
                prefix: "cli:".to_string(),
            },
        );
        let config = QueueConfig {
            default: "memory".to_string(),
            connections,
            ..QueueConfig::default()
        };
        QueueManager::new(config, Arc::new(JobRegistry::new()))
    }

    fn args(yes: bool) -> ClearArgs {
        ClearArgs {
            lane: "reports".to_string(),
            yes,
            connection: None,
        }
    }

    #[tokio::test]
    async fn test_clear_without_yes_names_the_lane_and_keeps_jobs() {
        let manager = manager();
        manager.push("GenerateDailyReportsJob", Payload::new(), "reports").await.unwrap();

        let err = run(&manager, args(false)).await.unwrap_err();
        assert_eq!(err.to_string(), "Refusing to clear 'reports' without --yes");
        assert_eq!(manager.size("reports").await.unwrap(), 1);

        run(&manager, args(true)).await.unwrap();
        assert_eq!(manager.size("reports").await.unwrap(), 0);
    }
}

//! Size command - ready job counts per lane
//!
//! Usage:
//! ```bash
//! mailflow size
//! mailflow size email reports --connection database
//! ```

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use std::collections::BTreeSet;

use mailflow_queue::QueueManager;

/// Arguments for the size command
#[derive(Args)]
pub struct SizeArgs {
    /// Lanes to inspect (defaults to every lane of every worker profile)
    pub lanes: Vec<String>,

    /// Queue connection (defaults to the configured default)
    #[arg(long)]
    pub connection: Option<String>,
}

/// Run the size command
pub async fn run(manager: &QueueManager, args: SizeArgs) -> Result<()> {
    let lanes: Vec<String> = if args.lanes.is_empty() {
        manager
            .config()
            .workers
            .values()
            .flat_map(|profile| profile.lanes.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    } else {
        args.lanes
    };

    let backend = super::backend(manager, args.connection.as_deref()).await?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Lane").fg(Color::Cyan),
            Cell::new("Ready").fg(Color::Cyan),
        ]);

    for lane in &lanes {
        let cell = match backend.size(lane).await {
            Ok(0) => Cell::new(0),
            Ok(n) => Cell::new(n).fg(Color::Yellow),
            Err(e) => Cell::new(format!("error: {e}")).fg(Color::Red),
        };
        table.add_row(vec![Cell::new(lane).fg(Color::Green), cell]);
    }

    println!("{} {}", "Queue sizes on".bold(), backend.name().cyan());
    println!("{table}");
    Ok(())
}

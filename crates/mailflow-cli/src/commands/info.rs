//! Info command - show configuration
//!
//! Usage:
//! ```bash
//! mailflow info
//! ```

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};

use mailflow_queue::{ConnectionConfig, QueueManager};

/// Arguments for the info command
#[derive(Args)]
pub struct InfoArgs;

/// Run the info command
pub fn run(manager: &QueueManager, _args: InfoArgs) -> Result<()> {
    let config = manager.config();
    let version = env!("CARGO_PKG_VERSION");

    println!("{}", "MailFlow Queue".bold().cyan());
    println!("{}", "═".repeat(50).cyan());
    println!("  {} {}", "Version:".dimmed(), version.green());
    println!();

    println!("{}", "Connections:".bold());
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("Driver").fg(Color::Cyan),
            Cell::new("Storage").fg(Color::Cyan),
        ]);
    for (name, connection) in &config.connections {
        let storage = match connection {
            ConnectionConfig::Memory { prefix } | ConnectionConfig::Redis { prefix, .. } => {
                format!("keys {prefix}*")
            }
            ConnectionConfig::Database { table, .. } => format!("table {table}"),
            ConnectionConfig::Sync => "inline".to_string(),
        };
        let mut name_cell = Cell::new(name).fg(Color::Green);
        if *name == config.default {
            name_cell = Cell::new(format!("{name} (default)")).fg(Color::Green);
        }
        table.add_row(vec![name_cell, Cell::new(connection.driver()), Cell::new(storage)]);
    }
    println!("{table}");
    println!();

    println!("{}", "Worker profiles:".bold());
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Profile").fg(Color::Cyan),
            Cell::new("Lanes").fg(Color::Cyan),
            Cell::new("Idle sleep").fg(Color::Cyan),
            Cell::new("Timeout").fg(Color::Cyan),
        ]);
    for (name, profile) in &config.workers {
        let timeout = match profile.timeout() {
            Some(t) => format!("{}s", t.as_secs()),
            None => "none".to_string(),
        };
        table.add_row(vec![
            Cell::new(name).fg(Color::Green),
            Cell::new(profile.lanes.join(", ")),
            Cell::new(format!("{}s", profile.sleep_secs)),
            Cell::new(timeout),
        ]);
    }
    println!("{table}");
    println!();

    println!("{}", "Scheduler:".bold());
    println!("  {} {}", "Timezone:".dimmed(), config.scheduler.timezone);
    println!("  {} {}", "Dedup:".dimmed(), config.scheduler.dedup);
    println!();

    println!("{}", "Job types:".bold());
    for name in manager.registry().names() {
        println!("  {} {}", "•".cyan(), name.green());
    }
    println!();

    Ok(())
}

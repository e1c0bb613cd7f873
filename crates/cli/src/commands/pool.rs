// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `devbox pool status` - warm-pool occupancy per (runtime, version).

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use devbox_daemon::AdminResponse;

use crate::client::DaemonClient;
use crate::output::OutputFormat;
use crate::table::{Align, Column, Table};

#[derive(Args)]
pub struct PoolArgs {
    #[command(subcommand)]
    pub command: Option<PoolCommand>,
}

#[derive(Subcommand)]
pub enum PoolCommand {
    /// Show warm-pool occupancy
    Status,
}

pub async fn handle(command: Option<PoolCommand>, format: OutputFormat) -> Result<()> {
    match command {
        Some(PoolCommand::Status) => status(format).await,
        None => {
            let cmd = crate::find_subcommand(crate::cli_command(), &["pool"]);
            crate::help::print_help(cmd);
            Ok(())
        }
    }
}

async fn status(format: OutputFormat) -> Result<()> {
    let client = DaemonClient::for_query().map_err(|e| anyhow!("{}", e))?;
    let response = client.pool_status().await.map_err(|e| anyhow!("{}", e))?;

    let entries = match response {
        AdminResponse::Pool { entries } => entries,
        _ => return Err(anyhow!("unexpected response from daemon")),
    };

    match format {
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No warm pools configured.");
                return Ok(());
            }

            let mut table = Table::new(vec![
                Column::left("RUNTIME"),
                Column {
                    align: Align::Right,
                    ..Column::left("IDLE")
                },
                Column {
                    align: Align::Right,
                    ..Column::left("ASSIGNED")
                },
            ]);
            for entry in &entries {
                table.row(vec![
                    entry.runtime.clone(),
                    entry.idle_count.to_string(),
                    entry.assigned_count.to_string(),
                ]);
            }
            table.render(&mut std::io::stdout());
        }
        OutputFormat::Json => {
            let obj = serde_json::json!({ "entries": entries });
            println!("{}", serde_json::to_string_pretty(&obj)?);
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `devbox status` - active sandboxes and pool sizes.

use anyhow::{anyhow, Result};
use devbox_daemon::AdminResponse;

use crate::client::DaemonClient;
use crate::output::OutputFormat;

fn format_uptime(secs: u64) -> String {
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

pub async fn status(format: OutputFormat) -> Result<()> {
    let not_running = || match format {
        OutputFormat::Text => {
            println!("Daemon not running");
            Ok(())
        }
        OutputFormat::Json => {
            println!(r#"{{ "status": "not_running" }}"#);
            Ok(())
        }
    };

    let client = match DaemonClient::for_query() {
        Ok(c) => c,
        Err(_) => return not_running(),
    };

    let response = match client.status().await {
        Ok(r) => r,
        Err(crate::client::ClientError::DaemonNotRunning) => return not_running(),
        Err(e) => return Err(anyhow!("{}", e)),
    };

    let (uptime_secs, sandboxes_active, sessions_active, connections_active) = match response {
        AdminResponse::Status {
            uptime_secs,
            sandboxes_active,
            sessions_active,
            connections_active,
        } => (uptime_secs, sandboxes_active, sessions_active, connections_active),
        _ => return Err(anyhow!("unexpected response from daemon")),
    };

    match format {
        OutputFormat::Text => {
            println!("Status: running");
            println!("Uptime: {}", format_uptime(uptime_secs));
            println!("Sandboxes: {} active", sandboxes_active);
            println!("Sessions: {} active", sessions_active);
            println!("Connections: {} active", connections_active);
        }
        OutputFormat::Json => {
            let obj = serde_json::json!({
                "status": "running",
                "uptime_secs": uptime_secs,
                "uptime": format_uptime(uptime_secs),
                "sandboxes_active": sandboxes_active,
                "sessions_active": sessions_active,
                "connections_active": connections_active,
            });
            println!("{}", serde_json::to_string_pretty(&obj)?);
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;

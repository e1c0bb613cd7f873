// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `devbox daemon` - daemon management commands

use crate::client::{daemon_stop, DaemonClient};
use crate::output::{display_log, OutputFormat};
use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::process::Command;

#[derive(Args)]
pub struct DaemonArgs {
    /// Print daemon version
    #[arg(short = 'v', long = "version")]
    pub version: bool,

    #[command(subcommand)]
    pub command: Option<DaemonCommand>,
}

#[derive(Subcommand)]
pub enum DaemonCommand {
    /// Start the daemon (foreground or background)
    Start {
        /// Run in foreground (useful for debugging)
        #[arg(long)]
        foreground: bool,
    },
    /// Stop the daemon
    Stop {
        /// Force-close all live IDE connections before stopping
        #[arg(long)]
        kill: bool,
    },
    /// Check daemon status
    Status,
    /// Stop and restart the daemon
    Restart {
        /// Force-close all live IDE connections before restarting
        #[arg(long)]
        kill: bool,
    },
    /// View daemon logs
    Logs {
        /// Number of recent lines to show (default: 50)
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
        /// Show all lines (no limit)
        #[arg(long, conflicts_with = "limit")]
        no_limit: bool,
        /// Follow log output
        #[arg(long, short)]
        follow: bool,
    },
}

pub async fn daemon(args: DaemonArgs, format: OutputFormat) -> Result<()> {
    if args.version {
        return version(format).await;
    }

    match args.command {
        Some(DaemonCommand::Start { foreground }) => start(foreground).await,
        Some(DaemonCommand::Stop { kill }) => stop(kill).await,
        Some(DaemonCommand::Restart { kill }) => restart(kill).await,
        Some(DaemonCommand::Status) => status(format).await,
        Some(DaemonCommand::Logs {
            limit,
            no_limit,
            follow,
        }) => logs(limit, no_limit, follow, format).await,
        None => {
            // No subcommand — show colorized help
            let cmd = crate::find_subcommand(crate::cli_command(), &["daemon"]);
            crate::help::print_help(cmd);
            Ok(())
        }
    }
}

async fn version(format: OutputFormat) -> Result<()> {
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

    let client = match DaemonClient::connect() {
        Ok(c) => c,
        Err(_) => return not_running(),
    };

    let version = match client.hello().await {
        Ok(v) => v,
        Err(crate::client::ClientError::DaemonNotRunning) => return not_running(),
        Err(_) => "unknown".to_string(),
    };

    match format {
        OutputFormat::Text => println!("devboxd {}", version),
        OutputFormat::Json => {
            let obj = serde_json::json!({ "version": version });
            println!("{}", serde_json::to_string_pretty(&obj)?);
        }
    }

    Ok(())
}

async fn start(foreground: bool) -> Result<()> {
    if foreground {
        // Run daemon in foreground - spawn and wait
        let devboxd_path = find_devboxd_binary()?;
        let status = Command::new(&devboxd_path).status()?;
        if !status.success() {
            return Err(anyhow!("Daemon exited with status: {}", status));
        }
        return Ok(());
    }

    // Check if already running
    if let Ok(client) = DaemonClient::connect() {
        if client.ping().await.is_ok() {
            println!("Daemon already running");
            return Ok(());
        }
    }

    // Start in background and verify it started
    match DaemonClient::for_action() {
        Ok(_client) => {
            println!("Daemon started");
            Ok(())
        }
        Err(e) => Err(anyhow!("{}", e)),
    }
}

async fn stop(kill: bool) -> Result<()> {
    match daemon_stop(kill).await {
        Ok(true) => {
            println!("Daemon stopped");
            Ok(())
        }
        Ok(false) => {
            println!("Daemon not running");
            Ok(())
        }
        Err(e) => Err(anyhow!("Failed to stop daemon: {}", e)),
    }
}

async fn restart(kill: bool) -> Result<()> {
    // Stop the daemon if running (ignore "not running" case)
    let was_running = daemon_stop(kill)
        .await
        .map_err(|e| anyhow!("Failed to stop daemon: {}", e))?;

    if was_running {
        // Grace period for the OS to release the Unix socket after exit.
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    }

    // Start in background
    match DaemonClient::for_action() {
        Ok(_client) => {
            println!("Daemon restarted");
            Ok(())
        }
        Err(e) => Err(anyhow!("{}", e)),
    }
}

async fn status(format: OutputFormat) -> Result<()> {
    crate::commands::status::status(format).await
}

async fn logs(limit: usize, no_limit: bool, follow: bool, format: OutputFormat) -> Result<()> {
    let log_path = get_log_path()?;

    if !log_path.exists() {
        match format {
            OutputFormat::Text => println!("No log file found at {}", log_path.display()),
            OutputFormat::Json => {
                let obj = serde_json::json!({
                    "log_path": log_path.to_string_lossy(),
                    "lines": [],
                });
                println!("{}", serde_json::to_string_pretty(&obj)?);
            }
        }
        return Ok(());
    }

    // Read the last N lines (or all lines with --no-limit)
    let content = if no_limit {
        std::fs::read_to_string(&log_path)?
    } else {
        read_last_lines(&log_path, limit)?
    };
    display_log(&log_path, &content, follow, format).await
}

fn read_last_lines(path: &std::path::Path, n: usize) -> Result<String> {
    use std::io::{BufRead, BufReader};
    let file = std::fs::File::open(path)?;
    let lines: Vec<String> = BufReader::new(file)
        .lines()
        .collect::<std::io::Result<_>>()?;
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].join("\n"))
}

fn find_devboxd_binary() -> Result<PathBuf> {
    let current_exe = std::env::current_exe().ok();

    // Only use CARGO_MANIFEST_DIR if the CLI itself is a debug build.
    // This prevents version mismatches when agents run with a debug
    // CARGO_MANIFEST_DIR inherited from a dev environment but a release build.
    let is_debug_build = current_exe
        .as_ref()
        .and_then(|p| p.to_str())
        .map(|s| s.contains("target/debug"))
        .unwrap_or(false);

    if is_debug_build {
        if let Some(manifest_dir) = crate::env::cargo_manifest_dir() {
            let dev_path = PathBuf::from(manifest_dir)
                .parent()
                .and_then(|p| p.parent())
                .map(|p| p.join("target/debug/devboxd"));
            if let Some(path) = dev_path {
                if path.exists() {
                    return Ok(path);
                }
            }
        }
    }

    // Check current executable's directory
    if let Some(ref exe) = current_exe {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("devboxd");
            if sibling.exists() {
                return Ok(sibling);
            }
        }
    }

    // Fall back to PATH lookup
    Ok(PathBuf::from("devboxd"))
}

fn get_log_path() -> Result<PathBuf> {
    Ok(crate::env::state_dir()?.join("logs").join("devboxd.log"))
}

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;

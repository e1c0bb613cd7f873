// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! devbox - admin CLI for the sandbox daemon (§4.12).
//!
//! Intentionally thin: a debugging aid for operators, not the tenant-facing
//! control plane. That surface (sandbox create/connect, IDE sessions) is
//! driven by the web UI and editor extensions talking to the daemon's IDE
//! multiplexer directly, not through this binary.

mod client;
mod color;
mod commands;
mod daemon_process;
mod env;
mod exit_error;
mod help;
mod output;
mod table;

use output::OutputFormat;

use anyhow::Result;
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use commands::{daemon, ledger, pool, reap, status};

#[derive(Parser)]
#[command(
    name = "devbox",
    version,
    disable_version_flag = true,
    about = "devbox - admin CLI for the sandbox daemon"
)]
struct Cli {
    /// Output format
    #[arg(
        short = 'o',
        long = "output",
        value_enum,
        default_value_t,
        global = true
    )]
    output: OutputFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Active sandboxes and pool sizes
    Status,
    /// Balance and recent transactions for an account
    Ledger(ledger::LedgerArgs),
    /// Warm-pool occupancy per (runtime, version)
    Pool(pool::PoolArgs),
    /// Manually reap a sandbox, bypassing idle/health heuristics
    Reap(reap::ReapArgs),
    /// Daemon management
    Daemon(daemon::DaemonArgs),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        let code = e
            .downcast_ref::<exit_error::ExitError>()
            .map_or(1, |c| c.code);
        let msg = format_error(&e);
        if !msg.is_empty() {
            eprintln!("Error: {}", msg);
        }
        std::process::exit(code);
    }
}

/// Format an anyhow error, deduplicating the chain.
///
/// If the top-level Display already contains the source error text, we skip
/// the "Caused by" chain to avoid noisy duplicate output (common when
/// thiserror variants use `#[error("... {0}")]` with `#[from]`).
/// Otherwise we render the full chain so context isn't lost.
fn format_error(err: &anyhow::Error) -> String {
    let top = err.to_string();

    let chain_redundant = err
        .chain()
        .skip(1)
        .all(|cause| top.contains(&cause.to_string()));

    if chain_redundant {
        return top;
    }

    let mut buf = top;
    for (i, cause) in err.chain().skip(1).enumerate() {
        buf.push_str(&format!("\n\nCaused by:\n    {}: {}", i, cause));
    }
    buf
}

fn cli_command() -> clap::Command {
    Cli::command()
        .help_template(help::template())
        .before_help(help::commands())
        .after_help(help::after_help())
        .styles(help::styles())
        .arg(
            clap::Arg::new("version")
                .short('v')
                .short_alias('V')
                .long("version")
                .action(clap::ArgAction::Version)
                .help("Print version"),
        )
}

async fn run() -> Result<()> {
    let matches = match cli_command().try_get_matches() {
        Ok(m) => m,
        Err(e) => {
            if e.kind() == clap::error::ErrorKind::DisplayHelp {
                // Intercept help requests → post-hoc colorized output
                let args: Vec<String> = std::env::args().collect();
                print_formatted_help(&args);
                return Ok(());
            }
            // DisplayVersion and other errors: let clap handle
            e.exit();
        }
    };
    let cli = Cli::from_arg_matches(&matches)?;
    let format = cli.output;

    let command = match cli.command {
        Some(cmd) => cmd,
        None => {
            // No subcommand provided — print colorized help and exit 0
            help::print_help(cli_command());
            return Ok(());
        }
    };

    match command {
        Commands::Status => status::status(format).await?,
        Commands::Ledger(args) => ledger::handle(args.command, format).await?,
        Commands::Pool(args) => pool::handle(args.command, format).await?,
        Commands::Reap(args) => reap::handle(args, format).await?,
        Commands::Daemon(args) => daemon::daemon(args, format).await?,
    }

    Ok(())
}

/// Print help with post-hoc colorization, resolving the correct subcommand from args.
fn print_formatted_help(args: &[String]) {
    let cmd = cli_command();

    // Extract subcommand names from args (skip binary name and flags).
    // Handle both "devbox daemon --help" and "devbox help daemon" patterns.
    let non_flags: Vec<&String> = args
        .iter()
        .skip(1)
        .filter(|arg| !arg.starts_with('-'))
        .collect();

    let subcommand_names: Vec<&str> = if non_flags.first().map(|s| s.as_str()) == Some("help") {
        non_flags.iter().skip(1).map(|s| s.as_str()).collect()
    } else {
        non_flags.iter().map(|s| s.as_str()).collect()
    };

    let target_cmd = find_subcommand(cmd, &subcommand_names);
    help::print_help(target_cmd);
}

/// Recursively find a nested subcommand by name path.
pub(crate) fn find_subcommand(mut cmd: clap::Command, names: &[&str]) -> clap::Command {
    for name in names {
        let mut found_sub = None;
        for sub in cmd.get_subcommands() {
            if sub.get_name() == *name || sub.get_all_aliases().any(|a| a == *name) {
                found_sub = Some(sub.get_name().to_string());
                break;
            }
        }
        if let Some(sub_name) = found_sub {
            if let Some(sub) = cmd.find_subcommand_mut(&sub_name) {
                cmd = sub.clone();
            } else {
                break;
            }
        } else {
            break;
        }
    }
    cmd
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `devbox reap <sandbox> --cause <cause>` - manual reap, for operators.
//!
//! Bypasses the idle/health heuristics the pool otherwise uses to decide
//! when a sandbox is torn down.

use anyhow::{anyhow, Result};
use clap::Args;

use crate::client::DaemonClient;
use crate::output::OutputFormat;

#[derive(Args)]
pub struct ReapArgs {
    /// Sandbox identifier
    pub sandbox: String,

    /// Reason recorded alongside the reap
    #[arg(long)]
    pub cause: String,
}

pub async fn handle(args: ReapArgs, format: OutputFormat) -> Result<()> {
    let client = DaemonClient::for_action().map_err(|e| anyhow!("{}", e))?;
    client
        .reap(&args.sandbox, &args.cause)
        .await
        .map_err(|e| anyhow!("{}", e))?;

    match format {
        OutputFormat::Text => println!("Reaped sandbox {} ({})", args.sandbox, args.cause),
        OutputFormat::Json => {
            let obj = serde_json::json!({ "reaped": args.sandbox, "cause": args.cause });
            println!("{}", serde_json::to_string_pretty(&obj)?);
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "reap_tests.rs"]
mod tests;

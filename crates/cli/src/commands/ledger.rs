// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `devbox ledger show <account>` - balance and recent transactions.

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use devbox_daemon::AdminResponse;

use crate::client::DaemonClient;
use crate::output::{format_time_ago, OutputFormat};
use crate::table::{Align, Column, Table};

#[derive(Args)]
pub struct LedgerArgs {
    #[command(subcommand)]
    pub command: Option<LedgerCommand>,
}

#[derive(Subcommand)]
pub enum LedgerCommand {
    /// Show balance and recent transactions for an account
    Show {
        /// Account identifier
        account: String,
    },
}

pub async fn handle(command: Option<LedgerCommand>, format: OutputFormat) -> Result<()> {
    match command {
        Some(LedgerCommand::Show { account }) => show(&account, format).await,
        None => {
            let cmd = crate::find_subcommand(crate::cli_command(), &["ledger"]);
            crate::help::print_help(cmd);
            Ok(())
        }
    }
}

async fn show(account: &str, format: OutputFormat) -> Result<()> {
    let client = DaemonClient::for_query().map_err(|e| anyhow!("{}", e))?;
    let response = client.ledger_show(account).await.map_err(|e| anyhow!("{}", e))?;

    let (account, balance, lifetime_earned, lifetime_spent, recent_transactions) = match response
    {
        AdminResponse::Ledger {
            account,
            balance,
            lifetime_earned,
            lifetime_spent,
            recent_transactions,
        } => (account, balance, lifetime_earned, lifetime_spent, recent_transactions),
        _ => return Err(anyhow!("unexpected response from daemon")),
    };

    match format {
        OutputFormat::Text => {
            println!("Account: {}", account);
            println!("Balance: {}", balance);
            println!("Lifetime earned: {}", lifetime_earned);
            println!("Lifetime spent: {}", lifetime_spent);

            if recent_transactions.is_empty() {
                println!("\nNo transactions recorded.");
                return Ok(());
            }

            println!();
            let mut table = Table::new(vec![
                Column::left("ID"),
                Column::left("KIND"),
                Column {
                    align: Align::Right,
                    ..Column::left("AMOUNT")
                },
                Column::muted("REFERENCE"),
                Column::muted("RECORDED"),
            ]);
            for tx in &recent_transactions {
                table.row(vec![
                    tx.id.clone(),
                    tx.kind.clone(),
                    tx.amount.clone(),
                    tx.reference.clone().unwrap_or_default(),
                    format_time_ago(tx.recorded_at_ms),
                ]);
            }
            table.render(&mut std::io::stdout());
        }
        OutputFormat::Json => {
            let obj = serde_json::json!({
                "account": account,
                "balance": balance,
                "lifetime_earned": lifetime_earned,
                "lifetime_spent": lifetime_spent,
                "recent_transactions": recent_transactions,
            });
            println!("{}", serde_json::to_string_pretty(&obj)?);
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "ledger_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{LedgerArgs, LedgerCommand};
use clap::Parser;

#[derive(Parser)]
struct Harness {
    #[command(subcommand)]
    command: Option<LedgerCommand>,
}

#[test]
fn show_parses_account_argument() {
    let harness = Harness::parse_from(["ledger", "show", "acct_123"]);
    match harness.command {
        Some(LedgerCommand::Show { account }) => assert_eq!(account, "acct_123"),
        None => panic!("expected Show subcommand"),
    }
}

#[test]
fn args_without_subcommand_is_none() {
    let args = LedgerArgs { command: None };
    assert!(args.command.is_none());
}

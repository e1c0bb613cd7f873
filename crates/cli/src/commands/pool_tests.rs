// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{PoolArgs, PoolCommand};
use clap::Parser;

#[derive(Parser)]
struct Harness {
    #[command(subcommand)]
    command: Option<PoolCommand>,
}

#[test]
fn status_parses() {
    let harness = Harness::parse_from(["pool", "status"]);
    assert!(matches!(harness.command, Some(PoolCommand::Status)));
}

#[test]
fn args_without_subcommand_is_none() {
    let args = PoolArgs { command: None };
    assert!(args.command.is_none());
}

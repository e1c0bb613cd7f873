// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::ReapArgs;
use clap::Parser;

#[derive(Parser)]
struct Harness {
    #[command(flatten)]
    args: ReapArgs,
}

#[test]
fn parses_sandbox_and_cause() {
    let harness = Harness::parse_from(["reap", "sbx_abc", "--cause", "stuck"]);
    assert_eq!(harness.args.sandbox, "sbx_abc");
    assert_eq!(harness.args.cause, "stuck");
}

#[test]
fn requires_cause() {
    let result = Harness::try_parse_from(["reap", "sbx_abc"]);
    assert!(result.is_err());
}

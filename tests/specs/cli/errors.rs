//! CLI error handling specs.
//!
//! Verify clap's own argument validation surfaces sensible errors before
//! any command reaches the daemon.

use crate::prelude::*;

#[test]
fn unknown_subcommand_shows_error() {
    cli()
        .args(&["nonexistent"])
        .fails()
        .stderr_has("unrecognized subcommand");
}

#[test]
fn ledger_show_missing_account_shows_error() {
    cli()
        .args(&["ledger", "show"])
        .fails()
        .stderr_has("required");
}

#[test]
fn reap_missing_cause_shows_error() {
    cli()
        .args(&["reap", "sbx_1"])
        .fails()
        .stderr_has("--cause");
}

#[test]
fn unknown_flag_shows_error() {
    cli()
        .args(&["status", "--bogus-flag"])
        .fails()
        .stderr_has("unexpected argument");
}

#[test]
fn invalid_output_format_shows_error() {
    cli()
        .args(&["-o", "yaml", "status"])
        .fails()
        .stderr_has("invalid value");
}

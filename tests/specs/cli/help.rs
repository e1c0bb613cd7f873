//! Help output specs.

use crate::prelude::*;

#[test]
fn bare_invocation_prints_help_and_exits_zero() {
    cli()
        .passes()
        .stdout_has("Usage:")
        .stdout_has("status")
        .stdout_has("daemon");
}

#[test]
fn help_flag_lists_all_commands() {
    cli()
        .args(&["-h"])
        .passes()
        .stdout_has("status")
        .stdout_has("ledger")
        .stdout_has("pool")
        .stdout_has("reap")
        .stdout_has("daemon");
}

#[test]
fn subcommand_help_shows_usage() {
    cli()
        .args(&["daemon", "-h"])
        .passes()
        .stdout_has("Usage:")
        .stdout_has("start")
        .stdout_has("stop");
}

#[test]
fn help_subcommand_matches_flag_form() {
    let via_flag = cli().args(&["daemon", "--help"]).passes().stdout();
    let via_help = cli().args(&["help", "daemon"]).passes().stdout();
    assert_eq!(via_flag, via_help);
}

#[test]
fn version_flag_reports_a_version() {
    cli().args(&["--version"]).passes().stdout_has("devbox");
}

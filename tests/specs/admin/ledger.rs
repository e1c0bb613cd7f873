//! `devbox ledger show` specs.

use crate::prelude::*;

#[test]
fn ledger_show_unknown_account_reports_error() {
    let daemon = Daemon::empty();
    daemon.devbox().args(&["daemon", "start"]).passes();

    assert!(wait_for(SPEC_WAIT_MAX_MS, || {
        daemon
            .devbox()
            .args(&["status"])
            .command()
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }));

    daemon
        .devbox()
        .args(&["ledger", "show", "acct_nonexistent"])
        .fails()
        .stderr_has("unknown account acct_nonexistent");
}

#[test]
fn ledger_show_requires_account_argument() {
    let daemon = Daemon::empty();
    daemon.devbox().args(&["ledger", "show"]).fails();
}

#[test]
fn ledger_against_stopped_daemon_reports_not_running() {
    let daemon = Daemon::empty();

    daemon
        .devbox()
        .args(&["ledger", "show", "acct_1"])
        .fails()
        .stderr_has("daemon not running");
}

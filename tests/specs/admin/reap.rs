//! `devbox reap` specs.

use crate::prelude::*;

#[test]
fn reap_unknown_sandbox_reports_error() {
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
        .args(&["reap", "sbx_nonexistent", "--cause", "idle"])
        .fails()
        .stderr_has("unknown sandbox sbx_nonexistent");
}

#[test]
fn reap_requires_cause_flag() {
    let daemon = Daemon::empty();
    daemon.devbox().args(&["reap", "sbx_1"]).fails();
}

#[test]
fn reap_unrecognized_cause_still_fails_on_unknown_sandbox() {
    // An operator typo in --cause should not block the command from
    // reaching the daemon; it just falls back to an admin-forced cause.
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
        .args(&["reap", "sbx_nonexistent", "--cause", "typo_cause"])
        .fails()
        .stderr_has("unknown sandbox sbx_nonexistent");
}

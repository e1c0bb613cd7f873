//! `devbox status` specs.

use crate::prelude::*;

#[test]
fn status_against_stopped_daemon_reports_not_running() {
    let daemon = Daemon::empty();

    daemon
        .devbox()
        .args(&["status"])
        .passes()
        .stdout_has("not running");
}

#[test]
fn status_json_against_stopped_daemon() {
    let daemon = Daemon::empty();

    let out = daemon
        .devbox()
        .args(&["-o", "json", "status"])
        .passes()
        .stdout();

    assert!(out.contains("\"not_running\""), "stdout: {out}");
}

#[test]
fn status_against_running_daemon_reports_zero_sandboxes() {
    let daemon = Daemon::empty();

    daemon
        .devbox()
        .args(&["daemon", "start"])
        .passes();

    assert!(wait_for(SPEC_WAIT_MAX_MS, || {
        daemon
            .devbox()
            .args(&["-o", "json", "status"])
            .command()
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }));

    let out = daemon
        .devbox()
        .args(&["-o", "json", "status"])
        .passes()
        .stdout();

    assert!(out.contains("\"sandboxes_active\": 0"), "stdout: {out}");
}

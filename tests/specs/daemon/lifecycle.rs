//! Daemon start/status/stop lifecycle specs.

use crate::prelude::*;

#[test]
fn start_then_status_then_stop_roundtrip() {
    let daemon = Daemon::empty();

    daemon
        .devbox()
        .args(&["daemon", "start"])
        .passes()
        .stdout_has("started");

    assert!(
        wait_for(SPEC_WAIT_MAX_MS, || {
            daemon
                .devbox()
                .args(&["daemon", "status"])
                .command()
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false)
        }),
        "daemon log: {}",
        daemon.log()
    );

    daemon
        .devbox()
        .args(&["daemon", "status"])
        .passes()
        .stdout_has("running");

    daemon.devbox().args(&["daemon", "stop"]).passes();

    assert!(wait_for(SPEC_WAIT_MAX_MS, || {
        !daemon
            .devbox()
            .args(&["daemon", "status"])
            .command()
            .output()
            .map(|o| o.status.success())
            .unwrap_or(true)
    }));
}

#[test]
fn second_start_is_idempotent() {
    let daemon = Daemon::empty();

    daemon.devbox().args(&["daemon", "start"]).passes();

    assert!(wait_for(SPEC_WAIT_MAX_MS, || {
        daemon
            .devbox()
            .args(&["daemon", "status"])
            .command()
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }));

    daemon
        .devbox()
        .args(&["daemon", "start"])
        .passes()
        .stdout_has("already running");
}

#[test]
fn restart_brings_daemon_back_up() {
    let daemon = Daemon::empty();

    daemon.devbox().args(&["daemon", "start"]).passes();

    assert!(wait_for(SPEC_WAIT_MAX_MS, || {
        daemon
            .devbox()
            .args(&["daemon", "status"])
            .command()
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }));

    daemon.devbox().args(&["daemon", "restart"]).passes();

    assert!(wait_for(SPEC_WAIT_MAX_MS, || {
        daemon
            .devbox()
            .args(&["daemon", "status"])
            .command()
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }));
}

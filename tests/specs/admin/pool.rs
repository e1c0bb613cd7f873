//! `devbox pool status` specs.

use crate::prelude::*;

#[test]
fn pool_status_lists_the_default_runtime_pool() {
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

    // A freshly started daemon configures exactly one warm pool, for the
    // default runtime, with nothing yet acquired or assigned.
    daemon
        .devbox()
        .args(&["pool", "status"])
        .passes()
        .stdout_has("RUNTIME")
        .stdout_has("IDLE")
        .stdout_has("ASSIGNED");
}

#[test]
fn pool_status_json_reports_entries() {
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

    let out = daemon
        .devbox()
        .args(&["-o", "json", "pool", "status"])
        .passes()
        .stdout();

    assert!(out.contains("\"entries\""), "stdout: {out}");
}

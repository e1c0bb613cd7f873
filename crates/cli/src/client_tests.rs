// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for daemon client behavior.

use super::{log_connection_error, ClientError, DaemonClient};
use crate::daemon_process::{cleanup_stale_socket, daemon_dir, probe_socket};
use serial_test::serial;
use std::fs;
use tempfile::tempdir;

/// Verify that connect() does not delete state files when the daemon isn't
/// running -- a regression test for a race where connect() would clean up
/// the lock file mid-startup, before the daemon finished initializing.
#[test]
#[serial]
fn connect_does_not_delete_lock_file() {
    let state_dir = tempdir().unwrap();
    std::env::set_var("DEVBOX_STATE_DIR", state_dir.path());

    let dir = daemon_dir().unwrap();
    fs::create_dir_all(&dir).unwrap();
    let lock_path = dir.join("devboxd.lock");
    fs::write(&lock_path, "12345").unwrap();

    let result = DaemonClient::connect();
    assert!(matches!(result, Err(ClientError::DaemonNotRunning)));

    assert!(lock_path.exists(), "connect() must not delete the lock file");

    std::env::remove_var("DEVBOX_STATE_DIR");
}

/// Verify log_connection_error creates cli.log with the expected fields.
#[test]
#[serial]
fn log_connection_error_creates_log_file() {
    let state_dir = tempdir().unwrap();
    std::env::set_var("DEVBOX_STATE_DIR", state_dir.path());

    let error = ClientError::DaemonNotRunning;
    log_connection_error(&error);

    let log_path = state_dir.path().join("cli.log");
    assert!(log_path.exists(), "cli.log should be created");

    let content = fs::read_to_string(&log_path).unwrap();
    assert!(content.contains("pid="), "log should contain pid");
    assert!(content.contains("cwd="), "log should contain cwd");
    assert!(
        content.contains("DEVBOX_STATE_DIR="),
        "log should contain DEVBOX_STATE_DIR"
    );
    assert!(
        content.contains("socket="),
        "log should contain socket path"
    );
    assert!(
        content.contains("daemon not running"),
        "log should contain error message"
    );

    std::env::remove_var("DEVBOX_STATE_DIR");
}

/// Verify log_connection_error includes the socket path in its output.
#[test]
#[serial]
fn log_connection_error_includes_socket_path() {
    let state_dir = tempdir().unwrap();
    std::env::set_var("DEVBOX_STATE_DIR", state_dir.path());

    let error = ClientError::DaemonNotRunning;
    log_connection_error(&error);

    let log_path = state_dir.path().join("cli.log");
    let content = fs::read_to_string(&log_path).unwrap();

    let expected_socket = state_dir.path().join("admin.sock");
    assert!(
        content.contains(&expected_socket.display().to_string()),
        "log should contain the expected socket path"
    );

    std::env::remove_var("DEVBOX_STATE_DIR");
}

/// Stale socket and lock files are cleaned up when the daemon process is dead.
#[test]
#[serial]
fn stale_socket_cleanup_when_process_dead() {
    let state_dir = tempdir().unwrap();
    std::env::set_var("DEVBOX_STATE_DIR", state_dir.path());

    let socket_path = state_dir.path().join("admin.sock");
    fs::write(&socket_path, "").unwrap();

    let mut child = std::process::Command::new("true").spawn().unwrap();
    let dead_pid = child.id();
    child.wait().unwrap();

    let lock_path = state_dir.path().join("devboxd.lock");
    fs::write(&lock_path, dead_pid.to_string()).unwrap();

    assert!(!probe_socket(&socket_path));

    cleanup_stale_socket().unwrap();

    assert!(!socket_path.exists(), "stale socket should be removed");
    assert!(!lock_path.exists(), "stale lock file should be removed");

    std::env::remove_var("DEVBOX_STATE_DIR");
}

/// A stale socket with no lock file at all is also removed -- the daemon
/// can't be running without one.
#[test]
#[serial]
fn stale_socket_cleanup_with_no_lock_file() {
    let state_dir = tempdir().unwrap();
    std::env::set_var("DEVBOX_STATE_DIR", state_dir.path());

    let socket_path = state_dir.path().join("admin.sock");
    fs::write(&socket_path, "").unwrap();

    let lock_path = state_dir.path().join("devboxd.lock");
    assert!(!lock_path.exists(), "lock file should not exist for this test");

    assert!(!probe_socket(&socket_path));

    cleanup_stale_socket().unwrap();

    assert!(!socket_path.exists(), "stale socket should be removed");

    std::env::remove_var("DEVBOX_STATE_DIR");
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon process management utilities.
//!
//! Functions for starting, stopping, and monitoring the `devboxd` process.

use crate::client::ClientError;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

/// Start the daemon in the background, returning the child process handle.
pub fn start_daemon_background() -> Result<std::process::Child, ClientError> {
    let devboxd_path = find_devboxd_binary()?;

    Command::new(&devboxd_path)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(|e| ClientError::DaemonStartFailed(e.to_string()))
}

/// Wait for a process to exit.
pub async fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if !process_exists(pid) {
            return true;
        }
        tokio::time::sleep(super::client::poll_interval()).await;
    }
    false
}

/// Find the `devboxd` binary.
fn find_devboxd_binary() -> Result<PathBuf, ClientError> {
    if let Some(path) = crate::env::daemon_binary() {
        return Ok(PathBuf::from(path));
    }

    let current_exe = std::env::current_exe().ok();

    // Only use CARGO_MANIFEST_DIR if the CLI itself is a debug build, so a
    // release `devbox` binary never picks up a dev-tree `devboxd` by accident.
    let is_debug_build = current_exe
        .as_ref()
        .and_then(|p| p.to_str())
        .map(|s| s.contains("target/debug"))
        .unwrap_or(false);

    if is_debug_build {
        if let Some(manifest_dir) = crate::env::cargo_manifest_dir() {
            let dev_path = PathBuf::from(manifest_dir)
                .parent()
                .and_then(|p| p.parent())
                .map(|p| p.join("target/debug/devboxd"));
            if let Some(path) = dev_path {
                if path.exists() {
                    return Ok(path);
                }
            }
        }
    }

    if let Some(ref exe) = current_exe {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("devboxd");
            if sibling.exists() {
                return Ok(sibling);
            }
        }
    }

    Ok(PathBuf::from("devboxd"))
}

/// Socket path for the admin protocol, matching `devbox_daemon::lifecycle::Config`.
pub fn daemon_socket() -> Result<PathBuf, ClientError> {
    let dir = daemon_dir()?;
    Ok(dir.join("admin.sock"))
}

/// State directory for the daemon's files (socket, pid, log, WAL, snapshot).
pub fn daemon_dir() -> Result<PathBuf, ClientError> {
    crate::env::state_dir()
}

/// Clean up a stale lock file left behind by a dead daemon.
///
/// Safe to call unconditionally: an `flock`-held lock file belonging to
/// a live daemon is never actually removed by another process holding
/// only a shared read, but this is only called after we've confirmed
/// the daemon isn't reachable.
pub fn cleanup_stale_pid(dir: &std::path::Path) {
    let lock_path = dir.join("devboxd.lock");
    if lock_path.exists() {
        let _ = std::fs::remove_file(&lock_path);
    }
}

/// Get the daemon's PID, written into its lock file at startup (see
/// `devbox_daemon::lifecycle::acquire_lock`).
pub fn read_daemon_pid() -> Result<Option<u32>, ClientError> {
    let dir = daemon_dir()?;
    let lock_path = dir.join("devboxd.lock");

    if !lock_path.exists() {
        return Ok(None);
    }

    match std::fs::read_to_string(&lock_path) {
        Ok(content) => Ok(content.trim().parse::<u32>().ok()),
        Err(_) => Ok(None),
    }
}

fn kill_signal(signal: &str, pid: u32) -> bool {
    Command::new("kill")
        .args([signal, &pid.to_string()])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Check if a process with the given PID exists.
pub fn process_exists(pid: u32) -> bool {
    kill_signal("-0", pid)
}

/// Force kill a daemon process.
pub fn force_kill_daemon(pid: u32) -> bool {
    kill_signal("-9", pid)
}

/// Startup marker prefix that `devboxd` writes to its log before anything else.
const STARTUP_MARKER_PREFIX: &str = "--- devboxd: starting (pid: ";

/// Read the daemon log from its startup marker, looking for errors.
pub fn read_startup_error() -> Option<String> {
    let dir = daemon_dir().ok()?;
    let log_path = dir.join("logs").join("devboxd.log");

    let content = std::fs::read_to_string(&log_path).ok()?;
    parse_startup_error(&content)
}

/// Parse startup errors from log content (pure logic, no I/O).
fn parse_startup_error(content: &str) -> Option<String> {
    let start_pos = content.rfind(STARTUP_MARKER_PREFIX)?;
    let startup_log = &content[start_pos..];

    let errors: Vec<&str> = startup_log
        .lines()
        .filter(|line| line.contains(" ERROR ") || line.contains("Failed to start"))
        .collect();

    if errors.is_empty() {
        return None;
    }

    let error_messages: Vec<String> = errors
        .iter()
        .filter_map(|line| line.split_once(": ").map(|(_, msg)| msg.to_string()))
        .collect();

    if error_messages.is_empty() {
        Some(errors.join("\n"))
    } else {
        Some(error_messages.join("\n"))
    }
}

/// Wrap an error with startup log info, if available.
pub fn wrap_with_startup_error(err: ClientError) -> ClientError {
    if matches!(err, ClientError::DaemonStartFailed(_)) {
        return err;
    }

    if let Some(startup_error) = read_startup_error() {
        ClientError::DaemonStartFailed(startup_error)
    } else {
        err
    }
}

/// Probe whether a Unix socket is accepting connections.
pub fn probe_socket(socket_path: &Path) -> bool {
    std::os::unix::net::UnixStream::connect(socket_path).is_ok()
}

/// Remove stale socket and PID files when the daemon is not running.
///
/// Called when the socket file exists but we can't connect to it. If the
/// PID file references a dead process (or no PID file exists), stale files
/// are removed so a fresh daemon can start.
pub fn cleanup_stale_socket() -> Result<(), ClientError> {
    let dir = daemon_dir()?;
    let socket_path = dir.join("admin.sock");
    let pid_path = dir.join("devboxd.lock");

    if pid_path.exists() {
        if let Ok(Some(pid)) = read_daemon_pid() {
            if !process_exists(pid) {
                let _ = std::fs::remove_file(&socket_path);
                let _ = std::fs::remove_file(&pid_path);
            }
        } else {
            let _ = std::fs::remove_file(&socket_path);
            let _ = std::fs::remove_file(&pid_path);
        }
    } else {
        let _ = std::fs::remove_file(&socket_path);
    }

    Ok(())
}

#[cfg(test)]
#[path = "daemon_process_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admin client: the `devbox` CLI's one-shot request/response connection
//! to a running `devboxd` over its admin Unix socket (§4.12). Every call
//! opens a fresh connection — the admin protocol is not a persistent
//! session, unlike the IDE multiplexer's duplex channel.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use devbox_daemon::protocol::{self, ProtocolError};
use devbox_daemon::{AdminRequest, AdminResponse};
use thiserror::Error;
use tokio::net::UnixStream;

use crate::daemon_process::{
    cleanup_stale_socket, daemon_dir, daemon_socket, probe_socket, start_daemon_background,
    wrap_with_startup_error,
};

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Timeout for a single admin IPC round-trip.
pub fn timeout_ipc() -> Duration {
    parse_duration_ms("DEVBOX_TIMEOUT_IPC_MS").unwrap_or(Duration::from_secs(5))
}

/// Timeout waiting for a freshly spawned daemon to start accepting connections.
pub fn timeout_connect() -> Duration {
    parse_duration_ms("DEVBOX_TIMEOUT_CONNECT_MS").unwrap_or(Duration::from_secs(5))
}

/// Timeout waiting for the daemon process to exit after a stop request.
pub fn timeout_exit() -> Duration {
    parse_duration_ms("DEVBOX_TIMEOUT_EXIT_MS").unwrap_or(Duration::from_secs(2))
}

/// Polling interval while waiting for the daemon to come up or go down.
pub fn poll_interval() -> Duration {
    parse_duration_ms("DEVBOX_CONNECT_POLL_MS").unwrap_or(Duration::from_millis(50))
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("daemon not running")]
    DaemonNotRunning,

    #[error("failed to start daemon: {0}")]
    DaemonStartFailed(String),

    #[error("timed out waiting for daemon to start")]
    DaemonStartTimeout,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("daemon returned an error: {0}")]
    Remote(String),

    #[error("unexpected response from daemon")]
    UnexpectedResponse,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not determine state directory")]
    NoStateDir,
}

/// One-shot client to the admin socket.
pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    /// For action commands (`reap`, `daemon stop`) — auto-starts the
    /// daemon if it isn't running, capped at one restart per process so
    /// a persistently broken daemon can't loop forever.
    pub fn for_action() -> Result<Self, ClientError> {
        Self::connect_or_start_once()
    }

    /// For query commands (`status`, `ledger show`, `pool status`) —
    /// connect only, never auto-start. A query against a daemon that
    /// isn't running has nothing useful to report anyway.
    pub fn for_query() -> Result<Self, ClientError> {
        Self::connect()
    }

    fn connect_or_start_once() -> Result<Self, ClientError> {
        static RESTARTED: AtomicBool = AtomicBool::new(false);

        match Self::connect() {
            Ok(client) => Ok(client),
            Err(ClientError::DaemonNotRunning) => {
                if RESTARTED.swap(true, Ordering::SeqCst) {
                    return Err(ClientError::DaemonNotRunning);
                }
                Self::start_and_wait()
            }
            Err(e) => Err(e),
        }
    }

    fn start_and_wait() -> Result<Self, ClientError> {
        cleanup_stale_socket()?;
        start_daemon_background()?;

        let socket_path = daemon_socket()?;
        let deadline = Instant::now() + timeout_connect();
        while Instant::now() < deadline {
            if probe_socket(&socket_path) {
                return Ok(Self { socket_path });
            }
            std::thread::sleep(poll_interval());
        }

        Err(wrap_with_startup_error(ClientError::DaemonStartTimeout))
    }

    /// Connect to an already-running daemon. Never spawns one.
    pub fn connect() -> Result<Self, ClientError> {
        let socket_path = daemon_socket()?;
        if !probe_socket(&socket_path) {
            return Err(ClientError::DaemonNotRunning);
        }
        Ok(Self { socket_path })
    }

    async fn send(&self, request: AdminRequest) -> Result<AdminResponse, ClientError> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|_| ClientError::DaemonNotRunning)?;
        let (mut reader, mut writer) = stream.into_split();

        protocol::write_typed(&mut writer, &request, timeout_ipc()).await?;
        let response: AdminResponse = protocol::read_typed(&mut reader, timeout_ipc()).await?;
        Ok(response)
    }

    pub async fn ping(&self) -> Result<(), ClientError> {
        match self.send(AdminRequest::Ping).await? {
            AdminResponse::Pong => Ok(()),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub async fn hello(&self) -> Result<String, ClientError> {
        match self
            .send(AdminRequest::Hello { version: protocol::PROTOCOL_VERSION.to_string() })
            .await?
        {
            AdminResponse::Hello { version } => Ok(version),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    pub async fn status(&self) -> Result<AdminResponse, ClientError> {
        let response = self.send(AdminRequest::Status).await?;
        reject_error(response)
    }

    pub async fn ledger_show(&self, account: &str) -> Result<AdminResponse, ClientError> {
        let response = self.send(AdminRequest::LedgerShow { account: account.to_string() }).await?;
        reject_error(response)
    }

    pub async fn pool_status(&self) -> Result<AdminResponse, ClientError> {
        let response = self.send(AdminRequest::PoolStatus).await?;
        reject_error(response)
    }

    pub async fn reap(&self, sandbox: &str, cause: &str) -> Result<(), ClientError> {
        let response = self
            .send(AdminRequest::Reap { sandbox: sandbox.to_string(), cause: cause.to_string() })
            .await?;
        match reject_error(response)? {
            AdminResponse::Ok => Ok(()),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Request a graceful shutdown. `kill` force-closes all live IDE
    /// connections before the daemon stops; otherwise it waits for
    /// in-flight requests to quiesce naturally.
    pub async fn shutdown(&self, kill: bool) -> Result<(), ClientError> {
        match self.send(AdminRequest::Shutdown { kill }).await? {
            AdminResponse::ShuttingDown => Ok(()),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }
}

fn reject_error(response: AdminResponse) -> Result<AdminResponse, ClientError> {
    match response {
        AdminResponse::Error { message } => Err(ClientError::Remote(message)),
        other => Ok(other),
    }
}

/// Stop the daemon (graceful request, then a forceful kill if it doesn't
/// exit promptly). Returns `true` if a daemon was actually stopped,
/// `false` if one wasn't running in the first place.
pub async fn daemon_stop(kill: bool) -> Result<bool, ClientError> {
    let client = match DaemonClient::connect() {
        Ok(c) => c,
        Err(ClientError::DaemonNotRunning) => {
            if let Ok(dir) = daemon_dir() {
                crate::daemon_process::cleanup_stale_pid(&dir);
            }
            return Ok(false);
        }
        Err(e) => return Err(e),
    };

    let shutdown_result = client.shutdown(kill).await;

    if let Some(pid) = crate::daemon_process::read_daemon_pid()? {
        if shutdown_result.is_ok() {
            crate::daemon_process::wait_for_exit(pid, timeout_exit()).await;
        }
        if crate::daemon_process::process_exists(pid) {
            crate::daemon_process::force_kill_daemon(pid);
            crate::daemon_process::wait_for_exit(pid, timeout_exit()).await;
        }
    }

    if let Ok(dir) = daemon_dir() {
        crate::daemon_process::cleanup_stale_pid(&dir);
    }

    Ok(true)
}

/// Write a diagnostic line to `<state_dir>/cli.log`, used when the CLI
/// fails to reach the daemon — useful when stdout/stderr aren't visible
/// (e.g. invoked from a script).
fn write_cli_log(message: String) {
    use std::io::Write;
    use std::time::SystemTime;

    let log_path = daemon_dir()
        .unwrap_or_else(|_| {
            std::env::var("HOME")
                .map(|h| PathBuf::from(h).join(".local/state/devbox"))
                .unwrap_or_else(|_| PathBuf::from("/tmp"))
        })
        .join("cli.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    if let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(&log_path) {
        let timestamp =
            SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        let pid = std::process::id();
        let cwd = std::env::current_dir().map(|p| p.display().to_string()).unwrap_or_else(|_| "(unknown)".to_string());
        let state_dir = std::env::var("DEVBOX_STATE_DIR").unwrap_or_else(|_| "(not set)".to_string());

        let _ = writeln!(file, "[ts={timestamp}] pid={pid} cwd={cwd} DEVBOX_STATE_DIR={state_dir} {message}");
    }
}

/// Log a connection failure for post-mortem debugging.
pub fn log_connection_error(error: &ClientError) {
    let socket_path = daemon_socket().map(|p| p.display().to_string()).unwrap_or_else(|_| "(unknown)".to_string());
    write_cli_log(format!("socket={socket_path} error={error}"));
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

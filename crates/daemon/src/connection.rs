// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live IDE connection registry (§3 IDE Connection, §4.7): owns every
//! connection's outbound writer queue and subordinate resources (PTYs,
//! watchers) so the multiplexer's per-connection read loop and the
//! effect dispatcher's close/reap paths share one source of truth. A
//! connection's subordinate resources are released on every exit path —
//! explicit close, heartbeat staleness, or a `CloseAllPtys`/`ClosePty`
//! effect fired when the orchestrator reaps the sandbox underneath it.

use async_trait::async_trait;
use devbox_core::{ConnectionId, IdeConnection, PtyId, SandboxId, WatcherId};
use devbox_driver::PtyHandle;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::effects::ConnectionRegistry;
use crate::multiplex::ServerMessage;

/// One live connection's subordinate state. Dropping this struct aborts
/// every watcher task still running for it — `file_watch`'s subscription
/// lifetime is the connection's lifetime (§4.7), and this is where that
/// lifetime actually ends.
struct ConnectionEntry {
    core: IdeConnection,
    writer: mpsc::Sender<ServerMessage>,
    ptys: HashMap<PtyId, PtyHandle>,
    watchers: HashMap<WatcherId, JoinHandle<()>>,
}

impl Drop for ConnectionEntry {
    fn drop(&mut self) {
        for task in self.watchers.values() {
            task.abort();
        }
    }
}

/// Registry of every IDE connection live on this daemon process.
/// `close_connection` only enqueues the close frame and drops the
/// entry — the reader loop that owns the actual socket notices the
/// queue close (or the frame itself) and tears down the stream.
#[derive(Default)]
pub struct ConnectionManager {
    connections: Mutex<HashMap<ConnectionId, ConnectionEntry>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly authenticated connection, returning the
    /// receiver its writer task should drain — the single serializing
    /// writer every subordinate task's emissions funnel through (§4.7).
    pub fn register(&self, core: IdeConnection, queue_capacity: usize) -> mpsc::Receiver<ServerMessage> {
        let (tx, rx) = mpsc::channel(queue_capacity);
        self.connections.lock().insert(
            core.id.clone(),
            ConnectionEntry {
                core,
                writer: tx,
                ptys: HashMap::new(),
                watchers: HashMap::new(),
            },
        );
        rx
    }

    /// Drop a connection's bookkeeping. Idempotent. Returns the sandbox
    /// it was bound to, if any, so the caller can decide whether to
    /// release it back to the pool or schedule a reap.
    pub fn unregister(&self, connection: &ConnectionId) -> Option<SandboxId> {
        self.connections
            .lock()
            .remove(connection)
            .and_then(|entry| entry.core.bound_sandbox_ref)
    }

    pub fn writer(&self, connection: &ConnectionId) -> Option<mpsc::Sender<ServerMessage>> {
        self.connections.lock().get(connection).map(|e| e.writer.clone())
    }

    pub fn bind_sandbox(&self, connection: &ConnectionId, sandbox: SandboxId) {
        if let Some(entry) = self.connections.lock().get_mut(connection) {
            entry.core.bind_sandbox(sandbox);
        }
    }

    pub fn record_heartbeat(&self, connection: &ConnectionId, at_ms: u64) {
        if let Some(entry) = self.connections.lock().get_mut(connection) {
            entry.core.record_heartbeat(at_ms);
        }
    }

    /// Every connection whose last heartbeat is older than
    /// `heartbeat_timeout_ms` as of `now_ms` (§4.7 heartbeat policy).
    pub fn stale_connections(&self, now_ms: u64, heartbeat_timeout_ms: u64) -> Vec<ConnectionId> {
        self.connections
            .lock()
            .values()
            .filter(|e| e.core.is_stale(now_ms, heartbeat_timeout_ms))
            .map(|e| e.core.id.clone())
            .collect()
    }

    pub fn register_pty(&self, connection: &ConnectionId, terminal: PtyId, handle: PtyHandle) {
        if let Some(entry) = self.connections.lock().get_mut(connection) {
            entry.core.register_pty(terminal.clone());
            entry.ptys.insert(terminal, handle);
        }
    }

    /// A clone of a registered PTY's input sender, for the per-connection
    /// read loop to forward `terminal_data` frames against — the reader
    /// task that drains `PtyHandle::output` holds the receiver half, so
    /// writing input has to go through the stored handle instead.
    pub fn pty_input_tx(&self, connection: &ConnectionId, terminal: &PtyId) -> Option<mpsc::Sender<Vec<u8>>> {
        self.connections
            .lock()
            .get(connection)?
            .ptys
            .get(terminal)
            .map(|h| h.input.clone())
    }

    pub fn pty_resize_tx(&self, connection: &ConnectionId, terminal: &PtyId) -> Option<mpsc::Sender<(u16, u16)>> {
        self.connections
            .lock()
            .get(connection)?
            .ptys
            .get(terminal)
            .map(|h| h.resize_tx())
    }

    pub fn register_watcher(&self, connection: &ConnectionId, watcher: WatcherId, task: JoinHandle<()>) {
        if let Some(entry) = self.connections.lock().get_mut(connection) {
            entry.core.register_watcher(watcher.clone());
            entry.watchers.insert(watcher, task);
        }
    }

    pub fn connection(&self, connection: &ConnectionId) -> Option<IdeConnection> {
        self.connections.lock().get(connection).map(|e| e.core.clone())
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    /// Every connection id currently registered, for a forced shutdown
    /// sweep that needs to close them all regardless of staleness.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.lock().keys().cloned().collect()
    }
}

#[async_trait]
impl ConnectionRegistry for ConnectionManager {
    async fn close_connection(&self, connection: &ConnectionId, close_code: u16, reason: &str) {
        let writer = self.connections.lock().get(connection).map(|e| e.writer.clone());
        if let Some(writer) = writer {
            let _ = writer
                .send(ServerMessage::Closed {
                    code: close_code,
                    reason: reason.to_string(),
                })
                .await;
        }
        self.unregister(connection);
    }

    async fn close_pty(&self, connection: &ConnectionId, terminal: &PtyId) {
        let handle = {
            let mut connections = self.connections.lock();
            let Some(entry) = connections.get_mut(connection) else {
                return;
            };
            entry.core.release_pty(terminal);
            entry.ptys.remove(terminal)
        };
        if let Some(mut handle) = handle {
            handle.close();
        }
    }

    async fn close_all_ptys_for_sandbox(&self, sandbox: &SandboxId) {
        let affected: Vec<(ConnectionId, Vec<PtyId>)> = {
            let connections = self.connections.lock();
            connections
                .iter()
                .filter(|(_, e)| e.core.bound_sandbox_ref.as_ref() == Some(sandbox))
                .map(|(id, e)| (id.clone(), e.ptys.keys().cloned().collect()))
                .collect()
        };
        for (connection, terminals) in affected {
            for terminal in terminals {
                self.close_pty(&connection, &terminal).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devbox_core::{ClientDescriptor, ProjectId, UserId};

    fn connection(id: &str) -> IdeConnection {
        IdeConnection::new(
            ConnectionId::new(id),
            UserId::new("user-1"),
            ProjectId::new("proj-1"),
            ClientDescriptor {
                kind: "vscode".to_string(),
                version: "1.0".to_string(),
                capabilities: vec![],
            },
            0,
        )
    }

    #[tokio::test]
    async fn close_connection_enqueues_closed_frame_and_removes_entry() {
        let manager = ConnectionManager::new();
        let mut rx = manager.register(connection("conn-1"), 16);

        manager.close_connection(&ConnectionId::new("conn-1"), 4003, "stale").await;

        let msg = rx.recv().await.unwrap();
        assert!(matches!(msg, ServerMessage::Closed { code: 4003, .. }));
        assert!(manager.connection(&ConnectionId::new("conn-1")).is_none());
    }

    #[tokio::test]
    async fn stale_connections_reports_past_heartbeat_timeout() {
        let manager = ConnectionManager::new();
        manager.register(connection("conn-1"), 16);
        manager.record_heartbeat(&ConnectionId::new("conn-1"), 1_000);

        assert!(manager.stale_connections(1_500, 1_000).is_empty());
        assert_eq!(
            manager.stale_connections(3_000, 1_000),
            vec![ConnectionId::new("conn-1")]
        );
    }

    #[tokio::test]
    async fn unregister_returns_bound_sandbox() {
        let manager = ConnectionManager::new();
        manager.register(connection("conn-1"), 16);
        manager.bind_sandbox(&ConnectionId::new("conn-1"), SandboxId::new("sbx-1"));

        let sandbox = manager.unregister(&ConnectionId::new("conn-1"));
        assert_eq!(sandbox, Some(SandboxId::new("sbx-1")));
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn close_all_ptys_for_sandbox_releases_every_matching_connection() {
        let manager = ConnectionManager::new();
        manager.register(connection("conn-1"), 16);
        manager.bind_sandbox(&ConnectionId::new("conn-1"), SandboxId::new("sbx-1"));

        let (input_tx, _input_rx) = mpsc::channel(1);
        let (_output_tx, output_rx) = mpsc::channel(1);
        let (resize_tx, _resize_rx) = mpsc::channel(1);
        let (close_tx, close_rx) = tokio::sync::oneshot::channel();
        let pty = PtyHandle::new(input_tx, output_rx, resize_tx, close_tx);
        manager.register_pty(&ConnectionId::new("conn-1"), PtyId::new("pty-1"), pty);

        manager.close_all_ptys_for_sandbox(&SandboxId::new("sbx-1")).await;

        assert!(close_rx.await.is_ok());
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The IDE Connection: one client's duplex session against the
//! multiplexer. The multiplexer exclusively owns a connection's
//! subordinate resources (PTYs, watchers) and must release every one of
//! them on every exit path.

use crate::ids::{PtyId, ProjectId, UserId, WatcherId};
use crate::sandbox::SandboxId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

crate::define_id! {
    /// Identifies one client's duplex connection to the multiplexer.
    pub struct ConnectionId;
}

/// Client identity declared at `auth` time: what IDE/editor this is,
/// which version, and which protocol capabilities it supports (e.g.
/// whether it understands DAP proxying).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDescriptor {
    pub kind: String,
    pub version: String,
    pub capabilities: Vec<String>,
}

impl ClientDescriptor {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

/// One client's duplex session. Bound to a sandbox once `auth` succeeds;
/// carries the set of subordinate resources that must be torn down
/// together when the connection closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdeConnection {
    pub id: ConnectionId,
    pub user_ref: UserId,
    pub project_ref: ProjectId,
    pub client: ClientDescriptor,
    pub bound_sandbox_ref: Option<SandboxId>,
    pub opened_at_ms: u64,
    pub last_heartbeat_at_ms: u64,
    pub ptys: HashSet<PtyId>,
    pub watchers: HashSet<WatcherId>,
}

impl IdeConnection {
    pub fn new(
        id: ConnectionId,
        user_ref: UserId,
        project_ref: ProjectId,
        client: ClientDescriptor,
        opened_at_ms: u64,
    ) -> Self {
        Self {
            id,
            user_ref,
            project_ref,
            client,
            bound_sandbox_ref: None,
            opened_at_ms,
            last_heartbeat_at_ms: opened_at_ms,
            ptys: HashSet::new(),
            watchers: HashSet::new(),
        }
    }

    pub fn bind_sandbox(&mut self, sandbox: SandboxId) {
        self.bound_sandbox_ref = Some(sandbox);
    }

    pub fn record_heartbeat(&mut self, at_ms: u64) {
        self.last_heartbeat_at_ms = at_ms;
    }

    /// Whether this connection has exceeded the heartbeat timeout as of
    /// `now_ms` and must be closed with cause `stale`.
    pub fn is_stale(&self, now_ms: u64, heartbeat_timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_heartbeat_at_ms) > heartbeat_timeout_ms
    }

    pub fn register_pty(&mut self, pty: PtyId) {
        self.ptys.insert(pty);
    }

    pub fn release_pty(&mut self, pty: &PtyId) {
        self.ptys.remove(pty);
    }

    pub fn register_watcher(&mut self, watcher: WatcherId) {
        self.watchers.insert(watcher);
    }

    pub fn release_watcher(&mut self, watcher: &WatcherId) {
        self.watchers.remove(watcher);
    }

    /// All subordinate resources, for the exit path that must release
    /// every one of them regardless of how the connection closed.
    pub fn has_subordinate_resources(&self) -> bool {
        !self.ptys.is_empty() || !self.watchers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> IdeConnection {
        IdeConnection::new(
            ConnectionId::new("conn-1"),
            UserId::new("user-1"),
            ProjectId::new("proj-1"),
            ClientDescriptor {
                kind: "vscode".to_string(),
                version: "1.0".to_string(),
                capabilities: vec!["dap".to_string()],
            },
            1_000,
        )
    }

    #[test]
    fn stale_detection_uses_heartbeat_timeout() {
        let conn = connection();
        assert!(!conn.is_stale(1_500, 1_000));
        assert!(conn.is_stale(3_000, 1_000));
    }

    #[test]
    fn releasing_ptys_and_watchers_clears_subordinate_flag() {
        let mut conn = connection();
        let pty = PtyId::new("pty-1");
        conn.register_pty(pty.clone());
        assert!(conn.has_subordinate_resources());
        conn.release_pty(&pty);
        assert!(!conn.has_subordinate_resources());
    }

    #[test]
    fn client_descriptor_reports_capabilities() {
        let conn = connection();
        assert!(conn.client.supports("dap"));
        assert!(!conn.client.supports("lsp"));
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Collaboration Broadcaster (§4.8): a per-project roster of connections
//! that fans out awareness and file-change events to everyone else in
//! the same project room. Delivery is best-effort — a slow or gone peer
//! never blocks or aborts the publish to the rest of the roster; the
//! multiplexer's own per-connection writer is what enforces backpressure
//! on that peer (§5: `slow_client`).

use devbox_core::{ConnectionId, ProjectId};
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::multiplex::ServerMessage;

/// One connection's awareness record: cursor, selection, focused file.
/// Absent fields mean the client hasn't reported that facet yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Awareness {
    pub focused_file: Option<String>,
    pub cursor_line: Option<u32>,
    pub cursor_col: Option<u32>,
    pub selection: Option<(u32, u32)>,
}

struct RosterEntry {
    sender: tokio::sync::mpsc::Sender<ServerMessage>,
    awareness: Awareness,
}

/// A roster entry visible to callers building `auth_ack`'s peer list.
#[derive(Debug, Clone, PartialEq)]
pub struct Peer {
    pub connection: ConnectionId,
    pub awareness: Awareness,
}

#[derive(Default)]
pub struct CollaborationBroadcaster {
    rooms: Mutex<HashMap<ProjectId, HashMap<ConnectionId, RosterEntry>>>,
}

impl CollaborationBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a project's room, registering the sender its
    /// publishes arrive on.
    pub fn join(
        &self,
        project: ProjectId,
        connection: ConnectionId,
        sender: tokio::sync::mpsc::Sender<ServerMessage>,
    ) {
        self.rooms.lock().entry(project).or_default().insert(
            connection,
            RosterEntry {
                sender,
                awareness: Awareness::default(),
            },
        );
    }

    /// Remove a connection from a project's room. A no-op if it was
    /// never a member (e.g. the connection closed before `auth`
    /// succeeded).
    pub fn leave(&self, project: &ProjectId, connection: &ConnectionId) {
        let mut rooms = self.rooms.lock();
        if let Some(room) = rooms.get_mut(project) {
            room.remove(connection);
            if room.is_empty() {
                rooms.remove(project);
            }
        }
    }

    /// Update a connection's awareness record in place.
    pub fn update_awareness(
        &self,
        project: &ProjectId,
        connection: &ConnectionId,
        awareness: Awareness,
    ) {
        if let Some(room) = self.rooms.lock().get_mut(project) {
            if let Some(entry) = room.get_mut(connection) {
                entry.awareness = awareness;
            }
        }
    }

    /// Fan out `message` to every member of `project`'s room except
    /// `originator`. A full or closed channel is logged and skipped —
    /// it never aborts delivery to the remaining peers.
    pub fn publish(&self, project: &ProjectId, message: ServerMessage, originator: &ConnectionId) {
        let rooms = self.rooms.lock();
        let Some(room) = rooms.get(project) else {
            return;
        };
        for (connection, entry) in room.iter() {
            if connection == originator {
                continue;
            }
            if entry.sender.try_send(message.clone()).is_err() {
                tracing::debug!(
                    %project, %connection,
                    "collaboration broadcast dropped: peer channel full or closed"
                );
            }
        }
    }

    /// The current roster of a project, for `auth_ack` to let a newly
    /// joined client discover its peers.
    pub fn roster(&self, project: &ProjectId) -> Vec<Peer> {
        self.rooms
            .lock()
            .get(project)
            .map(|room| {
                room.iter()
                    .map(|(connection, entry)| Peer {
                        connection: connection.clone(),
                        awareness: entry.awareness.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn room_size(&self, project: &ProjectId) -> usize {
        self.rooms.lock().get(project).map(HashMap::len).unwrap_or(0)
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The IDE Multiplexer's wire vocabulary (§4.7): the closed set of typed
//! messages carried over one client's duplex connection. Binary payloads
//! travel base64-encoded with an explicit `encoding` field rather than
//! switching the frame to a binary representation, so the whole channel
//! stays one JSON stream regardless of transport.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Close codes the server applies when it ends a connection on its own
/// initiative (§4.7, §6). Mirrors the target's native WebSocket-equivalent
/// close-code convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    AuthRequired,
    InvalidToken,
    Stale,
    SlowClient,
}

impl CloseCode {
    pub const fn code(self) -> u16 {
        match self {
            CloseCode::AuthRequired => 4001,
            CloseCode::InvalidToken => 4002,
            CloseCode::Stale => 4003,
            CloseCode::SlowClient => 4004,
        }
    }

    pub const fn reason(self) -> &'static str {
        match self {
            CloseCode::AuthRequired => "auth_required",
            CloseCode::InvalidToken => "invalid_token",
            CloseCode::Stale => "stale",
            CloseCode::SlowClient => "slow_client",
        }
    }
}

/// Declared protocol capabilities of a connecting client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientInfo {
    pub kind: String,
    pub version: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// A file's metadata as returned by `sync_response`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileMeta {
    pub path: String,
    pub size_bytes: u64,
    pub modified_ms: u64,
    pub is_dir: bool,
}

/// Sync scope requested by `sync_request`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Full,
    Incremental,
}

/// A file-watch notification kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileEventKind {
    Created,
    Modified,
    Removed,
}

/// Messages a client sends into the multiplexer. The first message on a
/// fresh connection MUST be `Auth`; anything else closes the connection
/// with [`CloseCode::AuthRequired`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Auth {
        token: String,
        project: String,
        client: ClientInfo,
    },
    FileRead {
        path: String,
    },
    FileWrite {
        path: String,
        bytes: String,
        encoding: String,
    },
    FileWatch {
        patterns: Vec<String>,
    },
    TerminalCreate {
        shell: String,
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(default)]
        cwd: Option<String>,
        rows: u16,
        cols: u16,
    },
    TerminalData {
        terminal_id: String,
        bytes: String,
    },
    TerminalResize {
        terminal_id: String,
        rows: u16,
        cols: u16,
    },
    LspRequest {
        id: u64,
        language: String,
        method: String,
        #[serde(default)]
        params: serde_json::Value,
    },
    DapRequest {
        seq: u64,
        command: String,
        #[serde(default)]
        arguments: serde_json::Value,
    },
    SyncRequest {
        mode: SyncMode,
        #[serde(default)]
        since: Option<u64>,
    },
    Heartbeat {
        ts: u64,
    },
}

/// Messages the multiplexer sends to a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    AuthAck {
        session_id: String,
        server_capabilities: Vec<String>,
    },
    FileContent {
        path: String,
        bytes: String,
        encoding: String,
    },
    FileWritten {
        path: String,
    },
    FileEvent {
        kind: FileEventKind,
        path: String,
        ts: u64,
    },
    /// Broadcast from the Collaboration Broadcaster (§4.8) when another
    /// connection in the same project room wrote a file.
    FileChanged {
        path: String,
        originator: String,
        ts: u64,
    },
    TerminalCreated {
        terminal_id: String,
    },
    TerminalOutput {
        terminal_id: String,
        bytes: String,
    },
    LspResponse {
        id: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<serde_json::Value>,
    },
    DapResponse {
        request_seq: u64,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        body: Option<serde_json::Value>,
    },
    SyncResponse {
        files: Vec<FileMeta>,
    },
    HeartbeatAck {
        ts: u64,
    },
    /// The server is ending the connection; carries the §6 close code.
    Closed {
        code: u16,
        reason: String,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn closed(code: CloseCode) -> Self {
        ServerMessage::Closed {
            code: code.code(),
            reason: code.reason().to_string(),
        }
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admin IPC protocol (§4.12): the small set of operator commands the
//! `devbox` CLI speaks to the daemon over a local Unix socket. This is a
//! debugging aid, not the tenant-facing control plane — the IDE
//! multiplexer in [`crate::multiplex`] is the real traffic.

#[path = "protocol_wire.rs"]
mod wire;
pub use wire::{
    decode, encode, read_message, read_typed, write_message, write_typed, ProtocolError,
    DEFAULT_TIMEOUT, MAX_MESSAGE_SIZE, PROTOCOL_VERSION,
};

use serde::{Deserialize, Serialize};

/// Request from the admin CLI to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdminRequest {
    /// Health check ping.
    Ping,
    /// Version handshake.
    Hello { version: String },
    /// Active sandboxes and pool sizes.
    Status,
    /// Balance and recent transactions for one account.
    LedgerShow { account: String },
    /// Warm-pool occupancy per (runtime, version) key.
    PoolStatus,
    /// Manually reap a sandbox, bypassing the idle/health heuristics.
    Reap { sandbox: String, cause: String },
    /// Request daemon shutdown.
    Shutdown {
        /// Force-close all live IDE connections before stopping.
        #[serde(default)]
        kill: bool,
    },
}

/// Summary of one committed ledger transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionSummary {
    pub id: String,
    pub amount: String,
    pub kind: String,
    pub reference: Option<String>,
    pub recorded_at_ms: u64,
}

/// Occupancy of one warm-pool key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolEntrySummary {
    pub runtime: String,
    pub idle_count: usize,
    pub assigned_count: usize,
}

/// Response from the daemon to the admin CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdminResponse {
    Ok,
    Pong,
    Hello {
        version: String,
    },
    Status {
        uptime_secs: u64,
        sandboxes_active: usize,
        sessions_active: usize,
        connections_active: usize,
    },
    Ledger {
        account: String,
        balance: String,
        lifetime_earned: String,
        lifetime_spent: String,
        recent_transactions: Vec<TransactionSummary>,
    },
    Pool {
        entries: Vec<PoolEntrySummary>,
    },
    ShuttingDown,
    Error {
        message: String,
    },
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! The devbox runtime store: a JSONL write-ahead log with group commit,
//! periodic snapshots for bounded replay on restart, and the materialized
//! view the engine and daemon query against.

mod snapshot;
mod state;
mod wal;

pub use snapshot::{Snapshot, SnapshotError};
pub use state::{
    AccountBalance, ApprovalRequestRecord, ConnectionRecord, MaterializedState, SandboxRecord,
    SessionRecord, TransactionRecord,
};
pub use wal::{Wal, WalEntry, WalError};

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use devbox_core::TransactionKind;
use rust_decimal_macros::dec;

#[test]
fn sandbox_created_idempotent() {
    let mut state = MaterializedState::default();
    state.apply_event(&sandbox_created("sbx-1"));
    let created_at = state.sandboxes["sbx-1"].created_at_ms;

    // A duplicated WAL entry (e.g. after a crash mid-flush) must not reset
    // the record.
    state.apply_event(&sandbox_created("sbx-1"));
    assert_eq!(state.sandboxes["sbx-1"].created_at_ms, created_at);
    assert_eq!(state.sandboxes.len(), 1);
}

#[test]
fn session_started_idempotent() {
    let mut state = MaterializedState::default();
    state.apply_event(&session_started("sess-1", "sbx-1"));
    let started_at = state.sessions["sess-1"].started_at_ms;

    state.apply_event(&session_started("sess-1", "sbx-1"));
    assert_eq!(state.sessions["sess-1"].started_at_ms, started_at);
    assert_eq!(state.sessions.len(), 1);
}

#[test]
fn ledger_transaction_idempotent() {
    let mut state = MaterializedState::default();
    let event = Event::LedgerTransaction {
        id: TransactionId::new("tx-1"),
        account: AccountId::new("acct-1"),
        amount: dec!(25),
        kind: TransactionKind::Grant,
        reference: None,
    };

    state.apply_event(&event);
    state.apply_event(&event);

    // Re-applying the same WAL record (replay after a crash between write
    // and checkpoint) must not double-credit the account.
    assert_eq!(state.accounts["acct-1"].balance, dec!(25));
    assert_eq!(state.transactions.len(), 1);
}

#[test]
fn approval_requested_idempotent() {
    let mut state = MaterializedState::default();
    let event = Event::ApprovalRequested {
        id: ApprovalRequestId::new("appr-1"),
        account: AccountId::new("acct-1"),
        amount: dec!(50),
    };

    state.apply_event(&event);
    state.apply_event(&event);

    assert_eq!(state.approval_requests.len(), 1);
}

#[test]
fn connection_opened_idempotent() {
    let mut state = MaterializedState::default();
    let event = Event::ConnectionOpened {
        id: ConnectionId::new("conn-1"),
        user: UserId::new("user-1"),
        project: ProjectId::new("proj-1"),
    };

    state.apply_event(&event);
    let opened_at = state.connections["conn-1"].opened_at_ms;
    state.apply_event(&event);

    assert_eq!(state.connections["conn-1"].opened_at_ms, opened_at);
    assert_eq!(state.connections.len(), 1);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

mod idempotency;

use super::*;
use devbox_core::{EnvironmentClass, TransactionKind};
use rust_decimal_macros::dec;

fn sandbox_created(id: &str) -> Event {
    Event::SandboxCreated {
        id: SandboxId::new(id),
        owner: UserId::new("user-1"),
        project: ProjectId::new("proj-1"),
    }
}

fn session_started(id: &str, sandbox: &str) -> Event {
    Event::SessionStarted {
        id: SessionId::new(id),
        user: UserId::new("user-1"),
        project: ProjectId::new("proj-1"),
        sandbox: SandboxId::new(sandbox),
        environment_class: EnvironmentClass::Production,
    }
}

// ── Sandbox lifecycle ────────────────────────────────────────────────────────

#[test]
fn apply_event_sandbox_lifecycle() {
    let mut state = MaterializedState::default();
    state.apply_event(&sandbox_created("sbx-1"));

    assert_eq!(state.sandboxes["sbx-1"].state, SandboxState::Creating);

    state.apply_event(&Event::SandboxStateChanged {
        id: SandboxId::new("sbx-1"),
        from: SandboxState::Creating,
        to: SandboxState::Running,
    });
    assert_eq!(state.sandboxes["sbx-1"].state, SandboxState::Running);

    state.apply_event(&Event::SandboxGone {
        id: SandboxId::new("sbx-1"),
    });
    assert_eq!(state.sandboxes["sbx-1"].state, SandboxState::Gone);
}

#[test]
fn get_sandbox_prefix_match() {
    let mut state = MaterializedState::default();
    state.apply_event(&sandbox_created("sbx-abc123"));

    assert_eq!(state.get_sandbox("sbx-abc123").unwrap().id, "sbx-abc123");
    assert_eq!(state.get_sandbox("sbx-abc").unwrap().id, "sbx-abc123");
    assert!(state.get_sandbox("sbx-xyz").is_none());
}

#[test]
fn get_sandbox_ambiguous_prefix_returns_none() {
    let mut state = MaterializedState::default();
    state.apply_event(&sandbox_created("sbx-abc123"));
    state.apply_event(&sandbox_created("sbx-abc456"));

    assert!(state.get_sandbox("sbx-abc").is_none());
}

// ── Session lifecycle ────────────────────────────────────────────────────────

#[test]
fn apply_event_session_lifecycle() {
    let mut state = MaterializedState::default();
    state.apply_event(&session_started("sess-1", "sbx-1"));

    assert!(!state.sessions["sess-1"].is_terminated());

    state.apply_event(&Event::SessionActivity {
        id: SessionId::new("sess-1"),
        at_ms: 5_000,
    });
    assert_eq!(state.sessions["sess-1"].last_activity_at_ms, 5_000);

    state.apply_event(&Event::SessionIdle {
        id: SessionId::new("sess-1"),
        since_ms: 6_000,
    });
    assert_eq!(state.sessions["sess-1"].idle_since_ms, Some(6_000));

    state.apply_event(&Event::SessionTerminated {
        id: SessionId::new("sess-1"),
        cause: TerminationCause::Idle,
        final_cost: dec!(1.5),
    });
    assert!(state.sessions["sess-1"].is_terminated());
    assert_eq!(state.sessions["sess-1"].final_cost, Some(dec!(1.5)));
}

#[test]
fn session_activity_clears_idle_streak() {
    let mut state = MaterializedState::default();
    state.apply_event(&session_started("sess-1", "sbx-1"));
    state.apply_event(&Event::SessionIdle {
        id: SessionId::new("sess-1"),
        since_ms: 2_000,
    });
    assert!(state.sessions["sess-1"].idle_since_ms.is_some());

    state.apply_event(&Event::SessionActivity {
        id: SessionId::new("sess-1"),
        at_ms: 3_000,
    });
    assert!(state.sessions["sess-1"].idle_since_ms.is_none());
}

// ── Ledger ────────────────────────────────────────────────────────────────────

#[test]
fn ledger_transaction_updates_account_balance() {
    let mut state = MaterializedState::default();
    state.apply_event(&Event::LedgerTransaction {
        id: TransactionId::new("tx-1"),
        account: AccountId::new("acct-1"),
        amount: dec!(100),
        kind: TransactionKind::Grant,
        reference: None,
    });
    state.apply_event(&Event::LedgerTransaction {
        id: TransactionId::new("tx-2"),
        account: AccountId::new("acct-1"),
        amount: dec!(-30),
        kind: TransactionKind::Usage,
        reference: Some("sess-1".to_string()),
    });

    let balance = &state.accounts["acct-1"];
    assert_eq!(balance.balance, dec!(70));
    assert_eq!(balance.lifetime_earned, dec!(100));
    assert_eq!(balance.lifetime_spent, dec!(30));
}

#[test]
fn approval_request_resolves_exactly_once() {
    let mut state = MaterializedState::default();
    state.apply_event(&Event::ApprovalRequested {
        id: ApprovalRequestId::new("appr-1"),
        account: AccountId::new("acct-1"),
        amount: dec!(50),
    });
    assert_eq!(
        state.approval_requests["appr-1"].status,
        ApprovalStatus::Pending
    );

    state.apply_event(&Event::ApprovalResolved {
        id: ApprovalRequestId::new("appr-1"),
        approved: true,
    });
    assert_eq!(
        state.approval_requests["appr-1"].status,
        ApprovalStatus::Approved
    );

    // A second resolution (e.g. a duplicated WAL entry) must not flip it back.
    state.apply_event(&Event::ApprovalResolved {
        id: ApprovalRequestId::new("appr-1"),
        approved: false,
    });
    assert_eq!(
        state.approval_requests["appr-1"].status,
        ApprovalStatus::Approved
    );
}

// ── Connections ───────────────────────────────────────────────────────────────

#[test]
fn apply_event_connection_lifecycle() {
    let mut state = MaterializedState::default();
    state.apply_event(&Event::ConnectionOpened {
        id: ConnectionId::new("conn-1"),
        user: UserId::new("user-1"),
        project: ProjectId::new("proj-1"),
    });
    assert!(state.connections.contains_key("conn-1"));

    state.apply_event(&Event::TerminalOpened {
        connection: ConnectionId::new("conn-1"),
        terminal: PtyId::new("pty-1"),
    });
    assert!(state.connections["conn-1"].ptys.contains(&PtyId::new("pty-1")));

    state.apply_event(&Event::ConnectionClosed {
        id: ConnectionId::new("conn-1"),
        reason: "user_requested".to_string(),
    });
    assert!(!state.connections.contains_key("conn-1"));
}

#[test]
fn unknown_event_type_is_a_no_op() {
    let mut state = MaterializedState::default();
    state.apply_event(&Event::Custom);
    assert!(state.sandboxes.is_empty());
    assert!(state.sessions.is_empty());
}

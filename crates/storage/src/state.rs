// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state built by replaying the event log.

use devbox_core::{
    AccountId, ApprovalRequestId, ApprovalStatus, ConnectionId, EnvironmentClass, Event,
    ProjectId, PtyId, SandboxId, SandboxState, SessionId, TerminationCause, TransactionId,
    TransactionKind, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

fn epoch_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Projection of a sandbox's lifecycle as seen through the event log. The
/// driver-level detail (runtime, limits, engine handle) lives with the
/// engine's live pool, not in the durable record — the log only needs
/// enough to answer "whose sandbox is this, and is it still alive".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxRecord {
    pub id: SandboxId,
    pub owner: UserId,
    pub project: ProjectId,
    pub state: SandboxState,
    pub created_at_ms: u64,
}

/// Projection of a session's lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub user_ref: UserId,
    pub project_ref: ProjectId,
    pub assigned_sandbox_ref: SandboxId,
    pub environment_class: EnvironmentClass,
    pub started_at_ms: u64,
    pub last_activity_at_ms: u64,
    pub idle_since_ms: Option<u64>,
    pub terminated_at_ms: Option<u64>,
    pub termination_cause: Option<TerminationCause>,
    pub final_cost: Option<Decimal>,
}

impl SessionRecord {
    pub fn is_terminated(&self) -> bool {
        self.terminated_at_ms.is_some()
    }
}

/// Projection of an IDE connection. Subordinate PTYs are tracked so a
/// restarted daemon knows what it still owes a teardown to; watchers are
/// not durable (the file-watch subscription itself dies with the process).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub id: ConnectionId,
    pub user_ref: UserId,
    pub project_ref: ProjectId,
    pub bound_sandbox_ref: Option<SandboxId>,
    pub opened_at_ms: u64,
    pub ptys: HashSet<PtyId>,
}

/// A materialized ledger balance. Rebuilt purely by folding transactions;
/// the account's configuration (owner, monthly allocation, team pool
/// membership) is established out of band and isn't part of the event
/// log's concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountBalance {
    pub id: String,
    pub balance: Decimal,
    pub lifetime_earned: Decimal,
    pub lifetime_spent: Decimal,
    pub gifted_sent: Decimal,
    pub gifted_received: Decimal,
}

impl AccountBalance {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    fn apply(&mut self, amount: Decimal, kind: TransactionKind) {
        self.balance += amount;
        match kind {
            TransactionKind::Grant | TransactionKind::Rollover | TransactionKind::Earning => {
                self.lifetime_earned += amount;
            }
            TransactionKind::Usage => self.lifetime_spent += -amount,
            TransactionKind::GiftOut => self.gifted_sent += -amount,
            TransactionKind::GiftIn => self.gifted_received += amount,
        }
    }
}

/// One append-only ledger entry as durably recorded. `recorded_at_ms` is
/// when this replica observed the transaction, not necessarily when the
/// engine constructed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub account_ref: AccountId,
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub reference: Option<String>,
    pub recorded_at_ms: u64,
}

/// Projection of a pending or resolved approval request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequestRecord {
    pub id: ApprovalRequestId,
    pub account_ref: AccountId,
    pub amount: Decimal,
    pub status: ApprovalStatus,
}

/// Materialized state built from WAL operations.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    pub sandboxes: HashMap<String, SandboxRecord>,
    pub sessions: HashMap<String, SessionRecord>,
    pub connections: HashMap<String, ConnectionRecord>,
    pub accounts: HashMap<String, AccountBalance>,
    pub transactions: HashMap<String, TransactionRecord>,
    pub approval_requests: HashMap<String, ApprovalRequestRecord>,
}

impl MaterializedState {
    /// Get a sandbox by id or unique id prefix (like git commit hashes).
    pub fn get_sandbox(&self, id: &str) -> Option<&SandboxRecord> {
        if let Some(sbx) = self.sandboxes.get(id) {
            return Some(sbx);
        }
        let matches: Vec<_> = self
            .sandboxes
            .iter()
            .filter(|(k, _)| k.starts_with(id))
            .collect();
        if matches.len() == 1 {
            Some(matches[0].1)
        } else {
            None
        }
    }

    /// Get a session by id or unique id prefix.
    pub fn get_session(&self, id: &str) -> Option<&SessionRecord> {
        if let Some(sess) = self.sessions.get(id) {
            return Some(sess);
        }
        let matches: Vec<_> = self
            .sessions
            .iter()
            .filter(|(k, _)| k.starts_with(id))
            .collect();
        if matches.len() == 1 {
            Some(matches[0].1)
        } else {
            None
        }
    }

    /// Apply an event to derive state changes.
    ///
    /// This is the event-sourcing approach where state is derived from
    /// events. Events are facts about what happened; state is derived from
    /// those facts.
    ///
    /// # Idempotency requirement
    ///
    /// All handlers below must be idempotent: applying the same event
    /// twice must produce the same state as applying it once, since events
    /// are applied both for immediate visibility and again on WAL replay
    /// after a restart. Guard inserts with existence checks and prefer
    /// assignment over accumulation for anything not already guarded by a
    /// dedicated id lookup (e.g. `transactions`/`approval_requests`).
    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::SandboxCreated { id, owner, project } => {
                self.sandboxes.entry(id.to_string()).or_insert_with(|| SandboxRecord {
                    id: id.clone(),
                    owner: owner.clone(),
                    project: project.clone(),
                    state: SandboxState::Creating,
                    created_at_ms: epoch_ms_now(),
                });
            }

            Event::SandboxStateChanged { id, to, .. } => {
                if let Some(sbx) = self.sandboxes.get_mut(id.as_str()) {
                    sbx.state = *to;
                }
            }

            Event::SandboxLimitsUpdated { .. } => {}

            Event::SandboxGone { id } => {
                if let Some(sbx) = self.sandboxes.get_mut(id.as_str()) {
                    sbx.state = SandboxState::Gone;
                }
            }

            Event::SessionStarted {
                id,
                user,
                project,
                sandbox,
                environment_class,
            } => {
                self.sessions.entry(id.to_string()).or_insert_with(|| {
                    let now = epoch_ms_now();
                    SessionRecord {
                        id: id.clone(),
                        user_ref: user.clone(),
                        project_ref: project.clone(),
                        assigned_sandbox_ref: sandbox.clone(),
                        environment_class: *environment_class,
                        started_at_ms: now,
                        last_activity_at_ms: now,
                        idle_since_ms: None,
                        terminated_at_ms: None,
                        termination_cause: None,
                        final_cost: None,
                    }
                });
            }

            Event::SessionActivity { id, at_ms } => {
                if let Some(sess) = self.sessions.get_mut(id.as_str()) {
                    if !sess.is_terminated() {
                        sess.last_activity_at_ms = *at_ms;
                        sess.idle_since_ms = None;
                    }
                }
            }

            Event::SessionIdle { id, since_ms } => {
                if let Some(sess) = self.sessions.get_mut(id.as_str()) {
                    if sess.idle_since_ms.is_none() {
                        sess.idle_since_ms = Some(*since_ms);
                    }
                }
            }

            Event::SessionTerminated { id, cause, final_cost } => {
                if let Some(sess) = self.sessions.get_mut(id.as_str()) {
                    if !sess.is_terminated() {
                        sess.terminated_at_ms = Some(epoch_ms_now());
                        sess.termination_cause = Some(*cause);
                        sess.final_cost = Some(*final_cost);
                    }
                }
            }

            // The live sampling ring and idle-streak bookkeeping are
            // in-memory engine state, not durable; a restarted daemon
            // simply resumes sampling from a cold streak.
            Event::UsageSnapshot { .. } => {}

            Event::LedgerTransaction { id, account, amount, kind, reference } => {
                if !self.transactions.contains_key(id.as_str()) {
                    self.transactions.insert(
                        id.to_string(),
                        TransactionRecord {
                            id: id.clone(),
                            account_ref: account.clone(),
                            amount: *amount,
                            kind: *kind,
                            reference: reference.clone(),
                            recorded_at_ms: epoch_ms_now(),
                        },
                    );
                    self.accounts
                        .entry(account.to_string())
                        .or_insert_with(|| AccountBalance::new(account.to_string()))
                        .apply(*amount, *kind);
                }
            }

            Event::ApprovalRequested { id, account, amount } => {
                self.approval_requests.entry(id.to_string()).or_insert_with(|| {
                    ApprovalRequestRecord {
                        id: id.clone(),
                        account_ref: account.clone(),
                        amount: *amount,
                        status: ApprovalStatus::Pending,
                    }
                });
            }

            Event::ApprovalResolved { id, approved } => {
                if let Some(req) = self.approval_requests.get_mut(id.as_str()) {
                    if req.status == ApprovalStatus::Pending {
                        req.status = if *approved {
                            ApprovalStatus::Approved
                        } else {
                            ApprovalStatus::Denied
                        };
                    }
                }
            }

            Event::ConnectionOpened { id, user, project } => {
                self.connections.entry(id.to_string()).or_insert_with(|| ConnectionRecord {
                    id: id.clone(),
                    user_ref: user.clone(),
                    project_ref: project.clone(),
                    bound_sandbox_ref: None,
                    opened_at_ms: epoch_ms_now(),
                    ptys: HashSet::new(),
                });
            }

            Event::ConnectionClosed { id, .. } => {
                self.connections.remove(id.as_str());
            }

            Event::TerminalOpened { connection, terminal } => {
                if let Some(conn) = self.connections.get_mut(connection.as_str()) {
                    conn.ptys.insert(terminal.clone());
                }
            }

            Event::Custom => {}
        }
    }
}

#[cfg(test)]
#[path = "state_tests/mod.rs"]
mod tests;

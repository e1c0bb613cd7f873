// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event types for the runtime core.
//!
//! Serializes with `{"type": "event:name", ...fields}` format. These are
//! the facts the Runtime Store persists as WAL records and replays into
//! its materialized view; an `Event` is never mutated once written.

use crate::account::AccountId;
use crate::approval::ApprovalRequestId;
use crate::connection::ConnectionId;
use crate::environment::EnvironmentClass;
use crate::ids::{ProjectId, PtyId, UserId};
use crate::metrics::ResourceSnapshot;
use crate::sandbox::{SandboxId, SandboxState};
use crate::session::{SessionId, TerminationCause};
use crate::transaction::{TransactionId, TransactionKind};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Events that record state transitions in the runtime core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- sandbox --
    #[serde(rename = "sandbox:created")]
    SandboxCreated {
        id: SandboxId,
        owner: UserId,
        project: ProjectId,
    },

    #[serde(rename = "sandbox:state_changed")]
    SandboxStateChanged {
        id: SandboxId,
        from: SandboxState,
        to: SandboxState,
    },

    #[serde(rename = "sandbox:limits_updated")]
    SandboxLimitsUpdated { id: SandboxId },

    #[serde(rename = "sandbox:gone")]
    SandboxGone { id: SandboxId },

    // -- session --
    #[serde(rename = "session:started")]
    SessionStarted {
        id: SessionId,
        user: UserId,
        project: ProjectId,
        sandbox: SandboxId,
        environment_class: EnvironmentClass,
    },

    #[serde(rename = "session:activity")]
    SessionActivity { id: SessionId, at_ms: u64 },

    #[serde(rename = "session:idle")]
    SessionIdle { id: SessionId, since_ms: u64 },

    #[serde(rename = "session:terminated")]
    SessionTerminated {
        id: SessionId,
        cause: TerminationCause,
        final_cost: Decimal,
    },

    // -- usage --
    #[serde(rename = "usage:snapshot")]
    UsageSnapshot {
        session: SessionId,
        snapshot: ResourceSnapshot,
    },

    // -- ledger --
    #[serde(rename = "ledger:transaction")]
    LedgerTransaction {
        id: TransactionId,
        account: AccountId,
        amount: Decimal,
        kind: TransactionKind,
        reference: Option<String>,
    },

    #[serde(rename = "ledger:approval_requested")]
    ApprovalRequested {
        id: ApprovalRequestId,
        account: AccountId,
        amount: Decimal,
    },

    #[serde(rename = "ledger:approval_resolved")]
    ApprovalResolved {
        id: ApprovalRequestId,
        approved: bool,
    },

    // -- connection --
    #[serde(rename = "connection:opened")]
    ConnectionOpened {
        id: ConnectionId,
        user: UserId,
        project: ProjectId,
    },

    #[serde(rename = "connection:closed")]
    ConnectionClosed { id: ConnectionId, reason: String },

    #[serde(rename = "connection:terminal_opened")]
    TerminalOpened {
        connection: ConnectionId,
        terminal: PtyId,
    },

    /// Catch-all for unknown event types (extensibility, forward
    /// compatibility of the WAL format).
    #[serde(other, skip_serializing)]
    Custom,
}

impl Event {
    pub fn name(&self) -> &str {
        match self {
            Event::SandboxCreated { .. } => "sandbox:created",
            Event::SandboxStateChanged { .. } => "sandbox:state_changed",
            Event::SandboxLimitsUpdated { .. } => "sandbox:limits_updated",
            Event::SandboxGone { .. } => "sandbox:gone",
            Event::SessionStarted { .. } => "session:started",
            Event::SessionActivity { .. } => "session:activity",
            Event::SessionIdle { .. } => "session:idle",
            Event::SessionTerminated { .. } => "session:terminated",
            Event::UsageSnapshot { .. } => "usage:snapshot",
            Event::LedgerTransaction { .. } => "ledger:transaction",
            Event::ApprovalRequested { .. } => "ledger:approval_requested",
            Event::ApprovalResolved { .. } => "ledger:approval_resolved",
            Event::ConnectionOpened { .. } => "connection:opened",
            Event::ConnectionClosed { .. } => "connection:closed",
            Event::TerminalOpened { .. } => "connection:terminal_opened",
            Event::Custom => "custom",
        }
    }

    pub fn log_summary(&self) -> String {
        let t = self.name();
        match self {
            Event::SandboxCreated { id, owner, .. } => format!("{t} id={id} owner={owner}"),
            Event::SandboxStateChanged { id, from, to } => {
                format!("{t} id={id} from={from:?} to={to:?}")
            }
            Event::SandboxLimitsUpdated { id } => format!("{t} id={id}"),
            Event::SandboxGone { id } => format!("{t} id={id}"),
            Event::SessionStarted { id, sandbox, .. } => format!("{t} id={id} sandbox={sandbox}"),
            Event::SessionActivity { id, .. } => format!("{t} id={id}"),
            Event::SessionIdle { id, since_ms } => format!("{t} id={id} since={since_ms}"),
            Event::SessionTerminated { id, cause, final_cost } => {
                format!("{t} id={id} cause={cause:?} cost={final_cost}")
            }
            Event::UsageSnapshot { session, .. } => format!("{t} session={session}"),
            Event::LedgerTransaction { id, account, amount, .. } => {
                format!("{t} id={id} account={account} amount={amount}")
            }
            Event::ApprovalRequested { id, account, amount } => {
                format!("{t} id={id} account={account} amount={amount}")
            }
            Event::ApprovalResolved { id, approved } => format!("{t} id={id} approved={approved}"),
            Event::ConnectionOpened { id, user, .. } => format!("{t} id={id} user={user}"),
            Event::ConnectionClosed { id, reason } => format!("{t} id={id} reason={reason}"),
            Event::TerminalOpened { connection, terminal } => {
                format!("{t} connection={connection} terminal={terminal}")
            }
            Event::Custom => t.to_string(),
        }
    }

    /// The session this event pertains to, where applicable. Used to key
    /// per-session subscriptions on the event bus.
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Event::SessionStarted { id, .. }
            | Event::SessionActivity { id, .. }
            | Event::SessionIdle { id, .. }
            | Event::SessionTerminated { id, .. } => Some(id),
            Event::UsageSnapshot { session, .. } => Some(session),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_tag_deserializes_to_custom() {
        let json = serde_json::json!({"type": "sandbox:teleported", "id": "sbx-1"});
        let event: Event = serde_json::from_value(json).unwrap();
        assert_eq!(event, Event::Custom);
    }

    #[test]
    fn round_trips_through_json() {
        let event = Event::SandboxGone {
            id: SandboxId::new("sbx-1"),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }

    #[test]
    fn session_id_extracts_from_session_scoped_events() {
        let event = Event::SessionActivity {
            id: SessionId::new("sess-1"),
            at_ms: 1_000,
        };
        assert_eq!(event.session_id().map(|s| s.as_str()), Some("sess-1"));
    }
}

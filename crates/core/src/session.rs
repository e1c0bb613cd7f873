// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Session entity: the binding of one user/project to one sandbox,
//! from assignment to reap. At most one active session exists per
//! (user, project) pair unless the caller explicitly requests a new one.

use crate::environment::EnvironmentClass;
use crate::ids::{ProjectId, UserId};
use crate::sandbox::SandboxId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a session, stable for its entire lifetime.
    pub struct SessionId;
}

/// Why a session was terminated. Recorded exactly once, at the moment
/// `terminated_at` is stamped; termination is monotonic and never
/// reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationCause {
    /// The user or IDE explicitly closed the session.
    UserRequested,
    /// Reaped by the idle-reap background task after exceeding the
    /// idle duration threshold.
    Idle,
    /// The owning account ran out of credits (hard limit, no grace).
    CreditsExhausted,
    /// The sandbox health probe failed past its retry budget.
    HealthCheckFailed,
    /// The daemon is shutting down and drained all live sessions.
    DaemonShutdown,
    /// An administrative force-reap via the operator CLI.
    AdminForced,
}

/// The binding of one user/project to one sandbox, from assignment to
/// reap. `idle_since` is set when the usage meter's idle-classification
/// streak crosses the idle duration threshold and cleared the moment
/// activity resumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
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
}

impl Session {
    pub fn new(
        id: SessionId,
        user_ref: UserId,
        project_ref: ProjectId,
        assigned_sandbox_ref: SandboxId,
        environment_class: EnvironmentClass,
        started_at_ms: u64,
    ) -> Self {
        Self {
            id,
            user_ref,
            project_ref,
            assigned_sandbox_ref,
            environment_class,
            started_at_ms,
            last_activity_at_ms: started_at_ms,
            idle_since_ms: None,
            terminated_at_ms: None,
            termination_cause: None,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated_at_ms.is_some()
    }

    pub fn is_idle(&self) -> bool {
        self.idle_since_ms.is_some()
    }

    /// Stamp activity, clearing any in-progress idle streak. No-op on an
    /// already-terminated session.
    pub fn record_activity(&mut self, at_ms: u64) {
        if self.is_terminated() {
            return;
        }
        self.last_activity_at_ms = at_ms;
        self.idle_since_ms = None;
    }

    /// Mark the start of an idle streak. Idempotent: calling this again
    /// while already idle does not push `idle_since_ms` forward.
    pub fn mark_idle(&mut self, at_ms: u64) {
        if self.idle_since_ms.is_none() {
            self.idle_since_ms = Some(at_ms);
        }
    }

    /// Terminate the session exactly once. Returns an error if already
    /// terminated, since `terminated_at` and `final_cost` must be
    /// computed exactly once per the ledger invariant.
    pub fn terminate(
        &mut self,
        at_ms: u64,
        cause: TerminationCause,
    ) -> Result<(), AlreadyTerminated> {
        if self.is_terminated() {
            return Err(AlreadyTerminated { session: self.id.clone() });
        }
        self.terminated_at_ms = Some(at_ms);
        self.termination_cause = Some(cause);
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("session {session} is already terminated")]
pub struct AlreadyTerminated {
    pub session: SessionId,
}

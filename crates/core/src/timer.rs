// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer identifier type for tracking scheduled timers.
//!
//! TimerId uniquely identifies a scheduled background action — health
//! probes, idle checks, ledger commits, pool maintenance, connection
//! heartbeats — so the scheduler can cancel or look one up by the entity
//! it belongs to without a separate index.

use crate::account::AccountId;
use crate::connection::ConnectionId;
use crate::sandbox::{Runtime, SandboxId};
use crate::session::SessionId;

crate::define_id! {
    /// Unique identifier for a timer instance.
    pub struct TimerId;
}

impl TimerId {
    /// Periodic health probe for a sandbox.
    pub fn health_probe(sandbox_id: &SandboxId) -> Self {
        Self::new(format!("health-probe:{}", sandbox_id))
    }

    pub fn is_health_probe(&self) -> bool {
        self.0.starts_with("health-probe:")
    }

    /// Idle-duration check for a session; fires repeatedly at the
    /// sampling cadence while the session's idle streak is being timed.
    pub fn idle_check(session_id: &SessionId) -> Self {
        Self::new(format!("idle-check:{}", session_id))
    }

    pub fn is_idle_check(&self) -> bool {
        self.0.starts_with("idle-check:")
    }

    /// Periodic credit debit commit for a session's accrued usage.
    pub fn credit_commit(session_id: &SessionId) -> Self {
        Self::new(format!("credit-commit:{}", session_id))
    }

    pub fn is_credit_commit(&self) -> bool {
        self.0.starts_with("credit-commit:")
    }

    /// Periodic rollover check for an account's monthly allotment.
    pub fn rollover(account_id: &AccountId) -> Self {
        Self::new(format!("rollover:{}", account_id))
    }

    pub fn is_rollover(&self) -> bool {
        self.0.starts_with("rollover:")
    }

    /// Pool refill for a given (runtime, version) key, scheduled after an
    /// `acquire` removes an entry.
    pub fn pool_refill(runtime: &Runtime) -> Self {
        Self::new(format!("pool-refill:{}", runtime))
    }

    pub fn is_pool_refill(&self) -> bool {
        self.0.starts_with("pool-refill:")
    }

    /// Age-based eviction sweep for a given (runtime, version) key.
    pub fn pool_evict(runtime: &Runtime) -> Self {
        Self::new(format!("pool-evict:{}", runtime))
    }

    pub fn is_pool_evict(&self) -> bool {
        self.0.starts_with("pool-evict:")
    }

    /// Heartbeat / slow-client detection for an IDE connection.
    pub fn connection_heartbeat(connection_id: &ConnectionId) -> Self {
        Self::new(format!("heartbeat:{}", connection_id))
    }

    pub fn is_connection_heartbeat(&self) -> bool {
        self.0.starts_with("heartbeat:")
    }

    /// Extract the session id portion if this is a session-scoped timer
    /// (`idle-check` or `credit-commit`).
    pub fn session_id_str(&self) -> Option<&str> {
        self.0
            .strip_prefix("idle-check:")
            .or_else(|| self.0.strip_prefix("credit-commit:"))
    }
}

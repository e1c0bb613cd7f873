// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for the engine's runtime components (§7). Each failure
//! mode maps to exactly one of the closed kinds the daemon translates
//! into an IDE close code or protocol response; no component below the
//! daemon reaches for a boxed `dyn Error`.

use devbox_core::{AccountId, ApprovalRequestId, IllegalTransition, SandboxId, SessionId, TeamPoolId};
use devbox_driver::DriverError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("sandbox {0} not found")]
    SandboxNotFound(SandboxId),

    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    #[error("session {0} is already terminated")]
    SessionAlreadyTerminated(SessionId),

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    #[error("pool is at capacity for this runtime key")]
    PoolFull,

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    #[error("account {account} has insufficient balance for {amount}")]
    InsufficientBalance { account: AccountId, amount: rust_decimal::Decimal },

    #[error("team pool {0} not found")]
    TeamPoolNotFound(TeamPoolId),

    #[error("member daily or monthly cap exceeded for team pool {0}")]
    CapExceeded(TeamPoolId),

    #[error("debit of {amount} requires approval, request {request} created")]
    ApprovalRequired {
        request: ApprovalRequestId,
        amount: rust_decimal::Decimal,
    },

    #[error("approval request {0} not found")]
    ApprovalRequestNotFound(ApprovalRequestId),

    #[error("invalid grant/consume amount: {0}")]
    InvalidAmount(String),
}

impl EngineError {
    /// Whether the orchestrator should retry the triggering operation
    /// locally (transient engine failure) rather than surface it.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Driver(e) if e.is_transient())
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effect dispatch: the one place that turns an `Effect` (a decision
//! already made by the orchestrator, ledger, or usage meter) into an
//! actual side effect — a WAL append, a driver call, a timer mutation, or
//! a close on a live IDE connection. Both the WAL-replay startup path and
//! the live `process_event` path in [`crate::lifecycle`] funnel through
//! [`EffectSink::apply`], so the two never drift.
//!
//! Effects can themselves produce more effects (`ReapSession` calls back
//! into the orchestrator, which returns `CommitUsage` and `Emit`
//! effects of its own) — `apply` drains that recursively rather than
//! leaving the caller to loop.

use std::sync::Arc;

use async_trait::async_trait;
use devbox_core::{Clock, ConnectionId, Effect, IdGen, PtyId, SandboxId};
use devbox_driver::SandboxDriver;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::event_bus::EventBus;
use crate::telemetry::Metrics;
use devbox_engine::{Ledger, Orchestrator, Scheduler};

/// What the effect dispatcher needs from whoever is holding live IDE
/// connections — implemented by [`crate::connection`]'s registry so this
/// module doesn't need to know about sockets or writer tasks.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    async fn close_connection(&self, connection: &ConnectionId, close_code: u16, reason: &str);
    async fn close_pty(&self, connection: &ConnectionId, terminal: &PtyId);
    async fn close_all_ptys_for_sandbox(&self, sandbox: &SandboxId);
}

/// A `ConnectionRegistry` that drops every close request — useful for
/// contexts that only ever replay persisted events (WAL replay at
/// startup has no live connections to close).
pub struct NullConnectionRegistry;

#[async_trait]
impl ConnectionRegistry for NullConnectionRegistry {
    async fn close_connection(&self, _connection: &ConnectionId, _close_code: u16, _reason: &str) {}
    async fn close_pty(&self, _connection: &ConnectionId, _terminal: &PtyId) {}
    async fn close_all_ptys_for_sandbox(&self, _sandbox: &SandboxId) {}
}

#[derive(Debug, thiserror::Error)]
pub enum EffectError {
    #[error(transparent)]
    Engine(#[from] devbox_engine::EngineError),
    #[error(transparent)]
    Wal(#[from] devbox_storage::WalError),
}

/// Interprets `Effect`s against the live orchestrator, ledger, scheduler,
/// event bus, and connection registry. Generic over the same `D, C, G`
/// triple as [`Orchestrator`] so it can be constructed with either the
/// real driver stack or the fakes used in tests.
pub struct EffectSink<D: SandboxDriver, C: Clock, G: IdGen> {
    orchestrator: Arc<Orchestrator<D, C, G>>,
    ledger: Arc<Ledger<C, G>>,
    scheduler: Arc<Mutex<Scheduler>>,
    clock: C,
    event_bus: EventBus,
    connections: Arc<dyn ConnectionRegistry>,
    metrics: Arc<Metrics>,
}

impl<D: SandboxDriver, C: Clock, G: IdGen> EffectSink<D, C, G> {
    pub fn new(
        orchestrator: Arc<Orchestrator<D, C, G>>,
        ledger: Arc<Ledger<C, G>>,
        scheduler: Arc<Mutex<Scheduler>>,
        clock: C,
        event_bus: EventBus,
        connections: Arc<dyn ConnectionRegistry>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            orchestrator,
            ledger,
            scheduler,
            clock,
            event_bus,
            connections,
            metrics,
        }
    }

    /// Apply a batch of effects, recursively draining any further
    /// effects a handler produces, depth-first, in the order they were
    /// returned.
    pub async fn apply(&self, effects: Vec<Effect>) -> Result<(), EffectError> {
        let mut pending = effects;
        while let Some(effect) = pending.pop() {
            let more = self.apply_one(effect).await?;
            pending.extend(more);
        }
        Ok(())
    }

    async fn apply_one(&self, effect: Effect) -> Result<Vec<Effect>, EffectError> {
        match effect {
            Effect::Emit { event } => {
                self.event_bus.send(event)?;
                Ok(Vec::new())
            }

            Effect::DestroySandbox { id } => {
                let effects = self.orchestrator.destroy_sandbox(&id).await?;
                self.metrics.record_sandbox_destroyed();
                Ok(effects)
            }

            Effect::ApplyLimits { id, limits } => {
                let effects = self.orchestrator.rescale(&id, limits).await?;
                Ok(effects)
            }

            Effect::CloseAllPtys { id } => {
                self.connections.close_all_ptys_for_sandbox(&id).await;
                Ok(Vec::new())
            }

            Effect::ReapSession { session, cause } => self.reap_session(session, cause).await,

            Effect::CommitUsage { account, amount, reference } => {
                if amount <= Decimal::ZERO {
                    return Ok(Vec::new());
                }
                match self.ledger.consume(&account, amount, "usage commit", reference.clone()) {
                    Ok((_, effects)) => {
                        self.metrics.record_credit_commit();
                        Ok(effects)
                    }
                    Err(devbox_engine::EngineError::InsufficientBalance { .. }) => {
                        // §7: insufficient_balance is rejected, never propagated as a
                        // bare error — the orchestrator reaps the session whose
                        // commit tipped the account negative (SPEC_FULL.md §9, S2).
                        self.metrics.record_credit_exhaustion();
                        let Some(session) = reference.as_deref().map(devbox_core::SessionId::new)
                        else {
                            return Ok(Vec::new());
                        };
                        Ok(vec![Effect::ReapSession {
                            session,
                            cause: devbox_core::TerminationCause::CreditsExhausted,
                        }])
                    }
                    Err(e) => Err(e.into()),
                }
            }

            Effect::CloseConnection { connection, close_code, reason } => {
                self.connections.close_connection(&connection, close_code, &reason).await;
                Ok(Vec::new())
            }

            Effect::ClosePty { connection, terminal } => {
                self.connections.close_pty(&connection, &terminal).await;
                Ok(Vec::new())
            }

            Effect::StartTimer { id, after } => {
                let now = self.clock.now();
                self.scheduler.lock().set_timer(id, after, now);
                Ok(Vec::new())
            }

            Effect::CancelTimer { id } => {
                self.scheduler.lock().cancel_timer(&id);
                Ok(Vec::new())
            }
        }
    }

    /// `ReapSession` carries no final cost or billing account of its own
    /// — those live with the usage meter and the session's owner, which
    /// only the daemon's lifecycle layer can resolve. This default path
    /// reaps with zero cost, for a session whose usage meter state was
    /// already drained by the caller (the common case: the caller that
    /// emits `ReapSession` already called `UsageMeter::take_pending_cost`
    /// and folded it into a `CommitUsage` effect ahead of this one).
    async fn reap_session(
        &self,
        session: devbox_core::SessionId,
        cause: devbox_core::TerminationCause,
    ) -> Result<Vec<Effect>, EffectError> {
        let Some(session_record) = self.orchestrator.session(&session) else {
            return Ok(Vec::new());
        };
        let effects = self
            .orchestrator
            .reap(&session, cause, Decimal::ZERO, session_record.user_ref.clone())
            .await?;
        self.metrics.record_sandbox_destroyed();
        Ok(effects)
    }
}

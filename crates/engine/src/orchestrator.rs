// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Orchestrator (§4.2/§4.3): assigns sandboxes to sessions (from a
//! warm pool when possible), rescales them in place, clones them for
//! fork-a-teammate's-environment workflows, and reaps them on idle,
//! credit exhaustion, health failure, or admin request. Background health,
//! idle, and autoscale sweeps are separate cancellable loops driven by a
//! `tokio_util::sync::CancellationToken` rather than anything spawned from
//! a constructor, so the daemon controls their lifetime explicitly.

use crate::error::EngineError;
use crate::pool::{pool_owner, pool_project, AutoscaleAction, PooledSandbox, SandboxPool};
use devbox_core::{
    Clock, Config, Effect, EnvironmentClass, Event, IdGen, ProjectId, ResourceLimits, Runtime,
    Sandbox, SandboxId, SandboxLabels, SandboxState, Session, SessionId, TerminationCause, TimerId,
    UserId,
};
use devbox_driver::{CheckpointRef, SandboxDriver, SandboxHandle, SandboxSpec};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Everything needed to build a fresh `SandboxSpec` for a runtime key.
/// The orchestrator is generic over this so callers decide image
/// selection and mount layout without the engine crate hardcoding it.
pub trait SpecBuilder: Send + Sync + 'static {
    fn build(&self, runtime: &Runtime, environment_class: EnvironmentClass) -> SandboxSpec;
}

/// A `SpecBuilder` backed by a plain function, for tests and simple
/// deployments that don't need a trait object.
pub struct FnSpecBuilder<F>(pub F);

impl<F> SpecBuilder for FnSpecBuilder<F>
where
    F: Fn(&Runtime, EnvironmentClass) -> SandboxSpec + Send + Sync + 'static,
{
    fn build(&self, runtime: &Runtime, environment_class: EnvironmentClass) -> SandboxSpec {
        (self.0)(runtime, environment_class)
    }
}

/// Coordinates sandbox lifetime against the pool and the driver. `D` is
/// the driver implementation, `C` the clock, `G` the id generator — all
/// swappable for deterministic tests.
pub struct Orchestrator<D: SandboxDriver, C: Clock, G: IdGen> {
    driver: D,
    pool: SandboxPool<D>,
    clock: C,
    ids: G,
    config: Config,
    spec_builder: Box<dyn SpecBuilder>,
    sandboxes: Mutex<HashMap<SandboxId, Sandbox>>,
    sessions: Mutex<HashMap<SessionId, Session>>,
    health_failures: Mutex<HashMap<SandboxId, u32>>,
}

impl<D: SandboxDriver, C: Clock, G: IdGen> Orchestrator<D, C, G> {
    pub fn new(driver: D, clock: C, ids: G, config: Config, spec_builder: Box<dyn SpecBuilder>) -> Self {
        Self {
            driver: driver.clone(),
            pool: SandboxPool::new(driver),
            clock,
            ids,
            config,
            spec_builder,
            sandboxes: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            health_failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn configure_pool(&self, runtime: Runtime, pool_config: devbox_core::config::PoolConfig) {
        self.pool.configure(runtime, pool_config);
    }

    /// The driver instance this orchestrator was built with. Exposed so
    /// callers that already hold a `Sandbox`/`SandboxId` (the IDE
    /// multiplexer's per-connection actor, in particular) can issue
    /// `exec`/`open_pty`/archive calls directly without the orchestrator
    /// growing a pass-through method per driver operation.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn sandbox(&self, id: &SandboxId) -> Result<Sandbox, EngineError> {
        self.sandboxes
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::SandboxNotFound(id.clone()))
    }

    pub fn session(&self, id: &SessionId) -> Option<Session> {
        self.sessions.lock().get(id).cloned()
    }

    /// `assign(user, project, runtime, force_new?)` (§4.2/§4.3): take a
    /// warm entry from the pool and repurpose it, or create fresh if the
    /// pool is empty or `force_new` is set. Schedules the background
    /// timers a live session needs (health probe, idle check, credit
    /// commit) as effects for the caller's scheduler to start.
    pub async fn assign(
        &self,
        user: UserId,
        project: ProjectId,
        runtime: Runtime,
        environment_class: EnvironmentClass,
        force_new: bool,
    ) -> Result<(Session, Sandbox, Vec<Effect>), EngineError> {
        let now_ms = self.clock.epoch_ms();
        let pooled = if force_new { None } else { self.pool.acquire(&runtime) };

        let (mut sandbox, is_new) = match pooled {
            Some(PooledSandbox { sandbox, .. }) => (sandbox, false),
            None => {
                let spec = self.spec_builder.build(&runtime, environment_class);
                let handle = self.driver.create(&spec).await?;
                self.driver.start(&handle).await?;
                (
                    Sandbox {
                        id: handle.id.clone(),
                        runtime: runtime.clone(),
                        limits: spec.limits,
                        security_profile_ref: spec.security_profile.name.clone(),
                        state: SandboxState::Creating,
                        engine_handle: handle.engine_handle,
                        labels: SandboxLabels {
                            owner: pool_owner(),
                            project: pool_project(),
                            session: None,
                            pooled: false,
                            created_at_ms: now_ms,
                        },
                    },
                    true,
                )
            }
        };

        if sandbox.state != SandboxState::Running {
            sandbox.transition(SandboxState::Running)?;
        }
        sandbox.labels = SandboxLabels {
            owner: user.clone(),
            project: project.clone(),
            session: None,
            pooled: false,
            created_at_ms: sandbox.labels.created_at_ms,
        };

        let session_id = SessionId::new(self.ids.next());
        let session = Session::new(
            session_id.clone(),
            user.clone(),
            project.clone(),
            sandbox.id.clone(),
            environment_class,
            now_ms,
        );
        sandbox.labels.session = Some(session_id.clone());

        let mut effects = Vec::new();
        if is_new {
            effects.push(Effect::Emit {
                event: Event::SandboxCreated {
                    id: sandbox.id.clone(),
                    owner: user,
                    project,
                },
            });
        }
        effects.push(Effect::Emit {
            event: Event::SessionStarted {
                id: session_id.clone(),
                user: session.user_ref.clone(),
                project: session.project_ref.clone(),
                sandbox: sandbox.id.clone(),
                environment_class,
            },
        });
        effects.push(Effect::StartTimer {
            id: TimerId::health_probe(&sandbox.id),
            after: self.config.health_probe_interval(),
        });
        effects.push(Effect::StartTimer {
            id: TimerId::idle_check(&session_id),
            after: self.config.sample_interval(),
        });
        effects.push(Effect::StartTimer {
            id: TimerId::credit_commit(&session_id),
            after: self.config.credit_commit_interval(),
        });

        self.sandboxes.lock().insert(sandbox.id.clone(), sandbox.clone());
        self.sessions.lock().insert(session_id, session.clone());

        Ok((session, sandbox, effects))
    }

    /// `rescale(sandbox, new_limits)` (§4.1/§4.3): hot-apply via the
    /// driver; idempotent if `new_limits` already matches.
    pub async fn rescale(&self, sandbox_id: &SandboxId, new_limits: ResourceLimits) -> Result<Vec<Effect>, EngineError> {
        let handle = {
            let sandboxes = self.sandboxes.lock();
            let sandbox = sandboxes
                .get(sandbox_id)
                .ok_or_else(|| EngineError::SandboxNotFound(sandbox_id.clone()))?;
            if sandbox.limits == new_limits {
                return Ok(Vec::new());
            }
            SandboxHandle::new(sandbox.id.clone(), sandbox.engine_handle.clone())
        };

        self.driver.update_limits(&handle, new_limits).await?;

        let mut sandboxes = self.sandboxes.lock();
        if let Some(sandbox) = sandboxes.get_mut(sandbox_id) {
            sandbox.limits = new_limits;
        }

        Ok(vec![Effect::Emit {
            event: Event::SandboxLimitsUpdated { id: sandbox_id.clone() },
        }])
    }

    /// `clone(source, new_owner, new_project)` (§4.1): tries a live
    /// checkpoint + restore; if the driver reports no checkpoint support,
    /// falls back to creating a fresh sandbox and transferring the
    /// workspace via archive.
    pub async fn clone_sandbox(
        &self,
        source: &SandboxId,
        new_owner: UserId,
        new_project: ProjectId,
    ) -> Result<(Sandbox, Vec<Effect>), EngineError> {
        let now_ms = self.clock.epoch_ms();
        let (source_sandbox, source_handle) = {
            let sandboxes = self.sandboxes.lock();
            let sandbox = sandboxes
                .get(source)
                .ok_or_else(|| EngineError::SandboxNotFound(source.clone()))?
                .clone();
            let handle = SandboxHandle::new(sandbox.id.clone(), sandbox.engine_handle.clone());
            (sandbox, handle)
        };

        let new_handle = match self.driver.checkpoint(&source_handle).await? {
            Some(checkpoint) => self.driver.restore(&checkpoint).await?,
            None => {
                let spec = self
                    .spec_builder
                    .build(&source_sandbox.runtime, EnvironmentClass::Development)
                    .with_mounts(Vec::new());
                let handle = self.driver.create(&spec).await?;
                self.driver.start(&handle).await?;
                let archive = self.driver.get_archive(&source_handle, "/workspace").await?;
                self.driver.put_archive(&handle, "/workspace", archive).await?;
                handle
            }
        };

        let clone = Sandbox {
            id: new_handle.id.clone(),
            runtime: source_sandbox.runtime.clone(),
            limits: source_sandbox.limits,
            security_profile_ref: source_sandbox.security_profile_ref.clone(),
            state: SandboxState::Running,
            engine_handle: new_handle.engine_handle,
            labels: SandboxLabels {
                owner: new_owner.clone(),
                project: new_project.clone(),
                session: None,
                pooled: false,
                created_at_ms: now_ms,
            },
        };
        self.sandboxes.lock().insert(clone.id.clone(), clone.clone());

        let effects = vec![Effect::Emit {
            event: Event::SandboxCreated {
                id: clone.id.clone(),
                owner: new_owner,
                project: new_project,
            },
        }];
        Ok((clone, effects))
    }

    /// `reap(session, cause)` (§4.3): stop the session's background
    /// timers, commit its final cost, destroy the sandbox via the
    /// driver, and mark both gone. `final_cost`/`account` are supplied by
    /// the usage meter, which is the only component that knows them.
    pub async fn reap(
        &self,
        session_id: &SessionId,
        cause: TerminationCause,
        final_cost: Decimal,
        account: UserId,
    ) -> Result<Vec<Effect>, EngineError> {
        let now_ms = self.clock.epoch_ms();
        let (mut session, sandbox_id) = {
            let sessions = self.sessions.lock();
            let session = sessions
                .get(session_id)
                .cloned()
                .ok_or_else(|| EngineError::SessionNotFound(session_id.clone()))?;
            let sandbox_id = session.assigned_sandbox_ref.clone();
            (session, sandbox_id)
        };

        let handle = {
            let mut sandboxes = self.sandboxes.lock();
            let sandbox = sandboxes
                .get_mut(&sandbox_id)
                .ok_or_else(|| EngineError::SandboxNotFound(sandbox_id.clone()))?;
            sandbox.transition(SandboxState::Reaping)?;
            SandboxHandle::new(sandbox.id.clone(), sandbox.engine_handle.clone())
        };

        self.driver.stop(&handle).await?;
        self.driver.delete(&handle).await?;

        {
            let mut sandboxes = self.sandboxes.lock();
            if let Some(sandbox) = sandboxes.get_mut(&sandbox_id) {
                sandbox.transition(SandboxState::Gone)?;
            }
        }
        self.health_failures.lock().remove(&sandbox_id);

        session
            .terminate(now_ms, cause)
            .map_err(|_| EngineError::SandboxNotFound(sandbox_id.clone()))?;
        self.sessions.lock().insert(session_id.clone(), session.clone());

        let effects = vec![
            Effect::CancelTimer { id: TimerId::health_probe(&sandbox_id) },
            Effect::CancelTimer { id: TimerId::idle_check(session_id) },
            Effect::CancelTimer { id: TimerId::credit_commit(session_id) },
            Effect::CommitUsage {
                account: devbox_core::AccountId::new(account.as_str()),
                amount: final_cost,
                reference: Some(session_id.to_string()),
            },
            Effect::Emit { event: Event::SandboxGone { id: sandbox_id } },
            Effect::Emit {
                event: Event::SessionTerminated {
                    id: session_id.clone(),
                    cause,
                    final_cost,
                },
            },
        ];
        Ok(effects)
    }

    /// One health-probe cycle for a single sandbox (§4.3): a failed probe
    /// increments a per-sandbox failure streak; crossing the configured
    /// budget is surfaced to the caller as a reap decision, never reaped
    /// from inside this call so the caller controls the final cost lookup.
    pub async fn health_check(&self, sandbox_id: &SandboxId) -> Result<bool, EngineError> {
        let handle = {
            let sandboxes = self.sandboxes.lock();
            let sandbox = sandboxes
                .get(sandbox_id)
                .ok_or_else(|| EngineError::SandboxNotFound(sandbox_id.clone()))?;
            SandboxHandle::new(sandbox.id.clone(), sandbox.engine_handle.clone())
        };

        match self.driver.sample_stats(&handle).await {
            Ok(_) => {
                self.health_failures.lock().remove(sandbox_id);
                Ok(true)
            }
            Err(e) if e.is_transient() => {
                let mut failures = self.health_failures.lock();
                let count = failures.entry(sandbox_id.clone()).or_insert(0);
                *count += 1;
                Ok(*count < self.config.health_probe_failure_budget)
            }
            Err(e) => Err(EngineError::from(e)),
        }
    }

    /// Background health-probe loop (§4.3): cancellable via the shared
    /// token rather than ever being spawned implicitly. Callers pick the
    /// sandboxes to probe each tick via `active_sandboxes`.
    pub async fn run_health_loop(
        &self,
        token: CancellationToken,
        active_sandboxes: impl Fn() -> Vec<SandboxId>,
    ) {
        let mut interval = tokio::time::interval(self.config.health_probe_interval());
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = interval.tick() => {
                    for id in active_sandboxes() {
                        let _ = self.health_check(&id).await;
                    }
                }
            }
        }
    }

    /// Background autoscale loop (§4.2): re-evaluates every key's demand
    /// ratio on a fixed cadence and grows/shrinks the pool accordingly.
    pub async fn run_autoscale_loop(&self, token: CancellationToken, keys: impl Fn() -> Vec<Runtime>, tick: Duration) {
        let mut interval = tokio::time::interval(tick);
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = interval.tick() => {
                    let now_ms = self.clock.epoch_ms();
                    for runtime in keys() {
                        match self.pool.autoscale_decision(&runtime) {
                            AutoscaleAction::GrowTo(target) => {
                                let spec = self.spec_builder.build(&runtime, EnvironmentClass::Development);
                                let _ = self.pool.refill_to(&runtime, target, &spec, now_ms).await;
                            }
                            AutoscaleAction::ShrinkTo(target) => {
                                let force_evict_at = now_ms + self.pool.config_for(&runtime).reuse_age_secs * 1_000 + 1;
                                for expired in self.pool.sweep_expired(&runtime, force_evict_at) {
                                    if self.pool.idle_count(&runtime) <= target {
                                        break;
                                    }
                                    let handle = SandboxHandle::new(expired.sandbox.id.clone(), expired.sandbox.engine_handle.clone());
                                    let _ = self.driver.stop(&handle).await;
                                    let _ = self.driver.delete(&handle).await;
                                }
                            }
                            AutoscaleAction::None => {}
                        }
                    }
                }
            }
        }
    }

    pub fn checkpoint_ref_for(&self, sandbox_id: &SandboxId) -> Option<CheckpointRef> {
        self.sandboxes
            .lock()
            .get(sandbox_id)
            .map(|s| CheckpointRef(s.engine_handle.clone()))
    }

    /// Every configured runtime key's warm-pool occupancy, for the admin
    /// `pool status` surface (§4.12).
    pub fn pool_status(&self) -> Vec<(Runtime, u32, u32)> {
        self.pool
            .configured_runtimes()
            .into_iter()
            .map(|rt| {
                let idle = self.pool.idle_count(&rt);
                let assigned = self.pool.assigned_count(&rt);
                (rt, idle, assigned)
            })
            .collect()
    }

    /// The runtime keys currently configured, for loops that need to
    /// sweep every key (autoscale, refill) without the caller hardcoding
    /// the set (§4.2).
    pub fn configured_runtimes(&self) -> Vec<Runtime> {
        self.pool.configured_runtimes()
    }

    /// Tear down a sandbox that has no live session attached (e.g. the
    /// `DestroySandbox` effect fired by an admin `reap` against a pooled
    /// entry, or a session whose `ReapSession` already ran). A no-op
    /// destroy on an already-`Gone` sandbox is not an error.
    pub async fn destroy_sandbox(&self, sandbox_id: &SandboxId) -> Result<Vec<Effect>, EngineError> {
        let handle = {
            let sandboxes = self.sandboxes.lock();
            let sandbox = sandboxes
                .get(sandbox_id)
                .ok_or_else(|| EngineError::SandboxNotFound(sandbox_id.clone()))?;
            if sandbox.state == SandboxState::Gone {
                return Ok(Vec::new());
            }
            SandboxHandle::new(sandbox.id.clone(), sandbox.engine_handle.clone())
        };

        self.driver.stop(&handle).await?;
        self.driver.delete(&handle).await?;

        {
            let mut sandboxes = self.sandboxes.lock();
            if let Some(sandbox) = sandboxes.get_mut(sandbox_id) {
                if sandbox.state != SandboxState::Gone {
                    sandbox.transition(SandboxState::Gone)?;
                }
            }
        }
        self.health_failures.lock().remove(sandbox_id);

        Ok(vec![Effect::Emit {
            event: Event::SandboxGone { id: sandbox_id.clone() },
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devbox_core::{FakeClock, SecurityProfile, SequentialIdGen};
    use devbox_driver::FakeDriver;
    use rust_decimal_macros::dec;

    fn spec_builder() -> Box<dyn SpecBuilder> {
        Box::new(FnSpecBuilder(|runtime: &Runtime, class: EnvironmentClass| {
            SandboxSpec::new(
                format!("{}:{}", runtime.language, runtime.version),
                vec!["sh".to_string()],
                class.default_limits(),
                SecurityProfile::locked_down("default"),
            )
        }))
    }

    fn orchestrator() -> Orchestrator<FakeDriver, FakeClock, SequentialIdGen> {
        Orchestrator::new(
            FakeDriver::new(),
            FakeClock::new(0),
            SequentialIdGen::new("sess"),
            Config::default(),
            spec_builder(),
        )
    }

    fn runtime() -> Runtime {
        Runtime::new("python", "3.11")
    }

    #[tokio::test]
    async fn assign_without_pool_creates_fresh_sandbox() {
        let orch = orchestrator();
        let (session, sandbox, effects) = orch
            .assign(
                UserId::new("user-1"),
                ProjectId::new("proj-1"),
                runtime(),
                EnvironmentClass::Development,
                false,
            )
            .await
            .unwrap();

        assert_eq!(sandbox.state, SandboxState::Running);
        assert_eq!(sandbox.labels.owner, UserId::new("user-1"));
        assert_eq!(session.assigned_sandbox_ref, sandbox.id);
        assert!(effects.iter().any(|e| matches!(e, Effect::Emit { event: Event::SandboxCreated { .. } })));
        assert!(effects.iter().any(|e| matches!(e, Effect::StartTimer { id, .. } if id.is_health_probe())));
    }

    #[tokio::test]
    async fn assign_prefers_pooled_entry_and_relabels_it() {
        let orch = orchestrator();
        orch.configure_pool(runtime(), devbox_core::config::PoolConfig::default());
        let spec = spec_builder().build(&runtime(), EnvironmentClass::Development);
        orch.pool.refill_to(&runtime(), 1, &spec, 0).await.unwrap();

        let (_, sandbox, effects) = orch
            .assign(
                UserId::new("user-1"),
                ProjectId::new("proj-1"),
                runtime(),
                EnvironmentClass::Development,
                false,
            )
            .await
            .unwrap();

        assert_eq!(sandbox.labels.owner, UserId::new("user-1"));
        assert!(!effects.iter().any(|e| matches!(e, Effect::Emit { event: Event::SandboxCreated { .. } })));
    }

    #[tokio::test]
    async fn rescale_is_idempotent_on_matching_limits() {
        let orch = orchestrator();
        let (_, sandbox, _) = orch
            .assign(UserId::new("u"), ProjectId::new("p"), runtime(), EnvironmentClass::Development, false)
            .await
            .unwrap();

        let effects = orch.rescale(&sandbox.id, sandbox.limits).await.unwrap();
        assert!(effects.is_empty());
    }

    #[tokio::test]
    async fn rescale_updates_limits_and_emits_event() {
        let orch = orchestrator();
        let (_, sandbox, _) = orch
            .assign(UserId::new("u"), ProjectId::new("p"), runtime(), EnvironmentClass::Development, false)
            .await
            .unwrap();

        let new_limits = EnvironmentClass::Production.default_limits();
        let effects = orch.rescale(&sandbox.id, new_limits).await.unwrap();
        assert_eq!(orch.sandbox(&sandbox.id).unwrap().limits, new_limits);
        assert!(matches!(effects[0], Effect::Emit { event: Event::SandboxLimitsUpdated { .. } }));
    }

    #[tokio::test]
    async fn reap_destroys_sandbox_and_commits_final_cost() {
        let orch = orchestrator();
        let (session, sandbox, _) = orch
            .assign(UserId::new("u"), ProjectId::new("p"), runtime(), EnvironmentClass::Development, false)
            .await
            .unwrap();

        let effects = orch
            .reap(&session.id, TerminationCause::Idle, dec!(1.5), UserId::new("u"))
            .await
            .unwrap();

        assert_eq!(orch.sandbox(&sandbox.id).unwrap().state, SandboxState::Gone);
        assert!(orch.session(&session.id).unwrap().is_terminated());
        assert!(effects.iter().any(|e| matches!(e, Effect::CommitUsage { amount, .. } if *amount == dec!(1.5))));
    }

    #[tokio::test]
    async fn clone_checkpoints_in_place_when_supported() {
        let orch = orchestrator();
        let (_, source, _) = orch
            .assign(UserId::new("u"), ProjectId::new("p"), runtime(), EnvironmentClass::Development, false)
            .await
            .unwrap();

        let (clone, effects) = orch
            .clone_sandbox(&source.id, UserId::new("u2"), ProjectId::new("p2"))
            .await
            .unwrap();

        assert_ne!(clone.id, source.id);
        assert_eq!(clone.labels.owner, UserId::new("u2"));
        assert!(orch.driver.calls().iter().any(|c| matches!(c, devbox_driver::DriverCall::Checkpoint(_))));
        assert!(effects.iter().any(|e| matches!(e, Effect::Emit { event: Event::SandboxCreated { .. } })));
    }

    #[tokio::test]
    async fn clone_falls_back_to_archive_transfer_when_checkpoint_unsupported() {
        let orch = orchestrator();
        orch.driver.disable_checkpoints();
        let (_, source, _) = orch
            .assign(UserId::new("u"), ProjectId::new("p"), runtime(), EnvironmentClass::Development, false)
            .await
            .unwrap();

        let (clone, _) = orch
            .clone_sandbox(&source.id, UserId::new("u2"), ProjectId::new("p2"))
            .await
            .unwrap();

        assert_ne!(clone.id, source.id);
        let calls = orch.driver.calls();
        assert!(calls.iter().any(|c| matches!(c, devbox_driver::DriverCall::GetArchive(..))));
        assert!(calls.iter().any(|c| matches!(c, devbox_driver::DriverCall::PutArchive(..))));
    }

    #[tokio::test]
    async fn health_check_streak_surfaces_budget_exhaustion() {
        let orch = orchestrator();
        let (_, sandbox, _) = orch
            .assign(UserId::new("u"), ProjectId::new("p"), runtime(), EnvironmentClass::Development, false)
            .await
            .unwrap();

        orch.driver.fail_next_sample_stats(orch.config.health_probe_failure_budget - 1);
        for _ in 0..orch.config.health_probe_failure_budget - 1 {
            assert!(orch.health_check(&sandbox.id).await.unwrap());
        }
        orch.driver.fail_next_sample_stats(1);
        assert!(!orch.health_check(&sandbox.id).await.unwrap());
    }
}

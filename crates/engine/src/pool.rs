// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sandbox Pool (§4.2): per-(runtime, version) warm pools with min/max
//! sizing, aging eviction, and demand-driven autoscaling. All mutation of
//! a key's membership and size goes through the single per-key mutex
//! embedded in `keys`, so `acquire`/`release` never race the background
//! refill/eviction/autoscale loops into size oscillation.

use crate::error::EngineError;
use devbox_core::{PoolConfig, ProjectId, Runtime, Sandbox, SandboxLabels, SandboxState, UserId};
use devbox_driver::{SandboxDriver, SandboxHandle, SandboxSpec};
use parking_lot::Mutex;
use std::collections::HashMap;

/// A warm sandbox sitting in a pool, not yet bound to any session. Labels
/// carry a placeholder owner/project until the orchestrator repurposes
/// the entry on acquisition (§4.2).
#[derive(Debug, Clone)]
pub struct PooledSandbox {
    pub sandbox: Sandbox,
    pub handle: SandboxHandle,
    pub created_at_ms: u64,
}

/// What `release` decided to do with a returned sandbox.
#[derive(Debug, Clone)]
pub enum ReleaseOutcome {
    /// Returned to the idle set for reuse.
    Kept,
    /// Too old or unhealthy; the caller must destroy it via the driver.
    Destroy(PooledSandbox),
}

/// What the autoscale loop decided for a key, based on the active-to-
/// pooled demand ratio against the key's water marks (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoscaleAction {
    None,
    GrowTo(u32),
    ShrinkTo(u32),
}

#[derive(Default)]
struct KeyState {
    idle: Vec<PooledSandbox>,
    assigned: u32,
}

/// Per-(runtime, version) warm pool.
pub struct SandboxPool<D: SandboxDriver> {
    driver: D,
    configs: Mutex<HashMap<Runtime, PoolConfig>>,
    keys: Mutex<HashMap<Runtime, KeyState>>,
}

/// Placeholder owner/project labels for an un-assigned pool entry. The
/// orchestrator overwrites these on acquisition as part of repurposing
/// (§4.2 step (a)).
pub fn pool_owner() -> UserId {
    UserId::new("pool")
}

pub fn pool_project() -> ProjectId {
    ProjectId::new("pool")
}

impl<D: SandboxDriver> SandboxPool<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            configs: Mutex::new(HashMap::new()),
            keys: Mutex::new(HashMap::new()),
        }
    }

    pub fn configure(&self, runtime: Runtime, config: PoolConfig) {
        self.configs.lock().insert(runtime, config);
    }

    pub fn config_for(&self, runtime: &Runtime) -> PoolConfig {
        self.configs.lock().get(runtime).copied().unwrap_or_default()
    }

    /// Every runtime key a pool has been configured for, for the admin
    /// `pool status` surface to enumerate.
    pub fn configured_runtimes(&self) -> Vec<Runtime> {
        self.configs.lock().keys().cloned().collect()
    }

    /// Number of warm, unassigned entries for a key. This is what the
    /// `pool_size{key} in [min, max]` invariant (§8 #6) refers to.
    pub fn idle_count(&self, runtime: &Runtime) -> u32 {
        self.keys
            .lock()
            .get(runtime)
            .map(|s| s.idle.len() as u32)
            .unwrap_or(0)
    }

    pub fn assigned_count(&self, runtime: &Runtime) -> u32 {
        self.keys.lock().get(runtime).map(|s| s.assigned).unwrap_or(0)
    }

    /// `acquire(key) -> (Sandbox | none)`. Atomically removes an idle
    /// entry and marks it assigned. Scheduling the refill task that
    /// follows a successful acquire is the caller's job (§4.2) since that
    /// refill is an async driver call this method must not block on.
    pub fn acquire(&self, runtime: &Runtime) -> Option<PooledSandbox> {
        let mut keys = self.keys.lock();
        let state = keys.entry(runtime.clone()).or_default();
        let entry = state.idle.pop();
        if entry.is_some() {
            state.assigned += 1;
        }
        entry
    }

    /// `release(Sandbox)` — returns an entry to the pool only if it is
    /// young enough, healthy, and there is room; otherwise the caller
    /// must destroy it via the driver.
    pub fn release(&self, runtime: &Runtime, entry: PooledSandbox, now_ms: u64, healthy: bool) -> ReleaseOutcome {
        let config = self.config_for(runtime);
        let age_ms = now_ms.saturating_sub(entry.created_at_ms);
        let reuse_age_ms = config.reuse_age_secs.saturating_mul(1000);

        let mut keys = self.keys.lock();
        let state = keys.entry(runtime.clone()).or_default();
        state.assigned = state.assigned.saturating_sub(1);

        if healthy && age_ms < reuse_age_ms && (state.idle.len() as u32) < config.max {
            state.idle.push(entry);
            ReleaseOutcome::Kept
        } else {
            ReleaseOutcome::Destroy(entry)
        }
    }

    /// Remove and return every idle entry older than the key's
    /// `reuse_age`, for the eviction loop to destroy via the driver.
    pub fn sweep_expired(&self, runtime: &Runtime, now_ms: u64) -> Vec<PooledSandbox> {
        let config = self.config_for(runtime);
        let reuse_age_ms = config.reuse_age_secs.saturating_mul(1000);

        let mut keys = self.keys.lock();
        let state = keys.entry(runtime.clone()).or_default();
        let mut kept = Vec::with_capacity(state.idle.len());
        let mut expired = Vec::new();
        for entry in state.idle.drain(..) {
            if now_ms.saturating_sub(entry.created_at_ms) < reuse_age_ms {
                kept.push(entry);
            } else {
                expired.push(entry);
            }
        }
        state.idle = kept;
        expired
    }

    /// Demand-based autoscale decision (§4.2): compares the
    /// active-to-pooled ratio for a key against its configured water
    /// marks. `None` when the key's total size is already at a stable
    /// point or would leave its [min, max] bounds.
    pub fn autoscale_decision(&self, runtime: &Runtime) -> AutoscaleAction {
        let config = self.config_for(runtime);
        let (idle, assigned) = {
            let mut keys = self.keys.lock();
            let state = keys.entry(runtime.clone()).or_default();
            (state.idle.len() as u32, state.assigned)
        };
        let total = idle + assigned;
        if total == 0 {
            return AutoscaleAction::None;
        }
        let demand_percent = assigned.saturating_mul(100) / total;
        if demand_percent > config.high_water_percent && total < config.max {
            AutoscaleAction::GrowTo((total + config.scale_step).min(config.max))
        } else if demand_percent < config.low_water_percent && idle > config.min {
            AutoscaleAction::ShrinkTo(config.min)
        } else {
            AutoscaleAction::None
        }
    }

    /// Create fresh warm entries via the driver until the idle set for
    /// `runtime` reaches `target_idle`. Used by both the refill loop
    /// (target = `min`) and the autoscale loop (target = the grow
    /// decision's size).
    pub async fn refill_to(
        &self,
        runtime: &Runtime,
        target_idle: u32,
        spec: &SandboxSpec,
        now_ms: u64,
    ) -> Result<u32, EngineError> {
        let mut created = 0;
        loop {
            let current = self.idle_count(runtime);
            if current >= target_idle {
                break;
            }
            let handle = self.driver.create(spec).await?;
            self.driver.start(&handle).await?;
            let sandbox = Sandbox {
                id: handle.id.clone(),
                runtime: runtime.clone(),
                limits: spec.limits,
                security_profile_ref: spec.security_profile.name.clone(),
                state: SandboxState::Running,
                engine_handle: handle.engine_handle.clone(),
                labels: SandboxLabels {
                    owner: pool_owner(),
                    project: pool_project(),
                    session: None,
                    pooled: true,
                    created_at_ms: now_ms,
                },
            };
            let mut keys = self.keys.lock();
            keys.entry(runtime.clone()).or_default().idle.push(PooledSandbox {
                sandbox,
                handle,
                created_at_ms: now_ms,
            });
            created += 1;
        }
        Ok(created)
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devbox_core::{EnvironmentClass, ResourceLimits, SecurityProfile};
    use devbox_driver::FakeDriver;

    fn runtime() -> Runtime {
        Runtime::new("python", "3.11")
    }

    fn spec() -> SandboxSpec {
        SandboxSpec::new(
            "python:3.11",
            vec!["python3".to_string()],
            EnvironmentClass::Development.default_limits(),
            SecurityProfile::locked_down("default"),
        )
    }

    fn pool() -> SandboxPool<FakeDriver> {
        SandboxPool::new(FakeDriver::new())
    }

    #[tokio::test]
    async fn acquire_on_empty_pool_returns_none() {
        let pool = pool();
        assert!(pool.acquire(&runtime()).is_none());
    }

    #[tokio::test]
    async fn refill_then_acquire_marks_assigned_and_empties_idle() {
        let pool = pool();
        let rt = runtime();
        pool.refill_to(&rt, 2, &spec(), 0).await.unwrap();
        assert_eq!(pool.idle_count(&rt), 2);

        let entry = pool.acquire(&rt).unwrap();
        assert_eq!(pool.idle_count(&rt), 1);
        assert_eq!(pool.assigned_count(&rt), 1);
        assert!(entry.sandbox.labels.pooled);
    }

    #[tokio::test]
    async fn release_within_reuse_age_is_kept() {
        let pool = pool();
        let rt = runtime();
        pool.configure(
            rt.clone(),
            PoolConfig {
                min: 1,
                max: 5,
                reuse_age_secs: 3600,
                high_water_percent: 80,
                low_water_percent: 20,
                scale_step: 2,
            },
        );
        pool.refill_to(&rt, 1, &spec(), 0).await.unwrap();
        let entry = pool.acquire(&rt).unwrap();

        let outcome = pool.release(&rt, entry, 1_000, true);
        assert!(matches!(outcome, ReleaseOutcome::Kept));
        assert_eq!(pool.idle_count(&rt), 1);
        assert_eq!(pool.assigned_count(&rt), 0);
    }

    #[tokio::test]
    async fn release_past_reuse_age_is_destroyed() {
        let pool = pool();
        let rt = runtime();
        pool.configure(
            rt.clone(),
            PoolConfig {
                min: 1,
                max: 5,
                reuse_age_secs: 10,
                high_water_percent: 80,
                low_water_percent: 20,
                scale_step: 2,
            },
        );
        pool.refill_to(&rt, 1, &spec(), 0).await.unwrap();
        let entry = pool.acquire(&rt).unwrap();

        let outcome = pool.release(&rt, entry, 20_000, true);
        assert!(matches!(outcome, ReleaseOutcome::Destroy(_)));
        assert_eq!(pool.idle_count(&rt), 0);
    }

    #[tokio::test]
    async fn release_unhealthy_entry_is_destroyed_even_if_young() {
        let pool = pool();
        let rt = runtime();
        pool.refill_to(&rt, 1, &spec(), 0).await.unwrap();
        let entry = pool.acquire(&rt).unwrap();

        let outcome = pool.release(&rt, entry, 10, false);
        assert!(matches!(outcome, ReleaseOutcome::Destroy(_)));
    }

    #[tokio::test]
    async fn sweep_expired_removes_only_stale_entries() {
        let pool = pool();
        let rt = runtime();
        pool.configure(
            rt.clone(),
            PoolConfig {
                min: 0,
                max: 5,
                reuse_age_secs: 10,
                high_water_percent: 80,
                low_water_percent: 20,
                scale_step: 2,
            },
        );
        pool.refill_to(&rt, 1, &spec(), 0).await.unwrap();
        pool.refill_to(&rt, 2, &spec(), 5_000).await.unwrap();

        let expired = pool.sweep_expired(&rt, 11_000);
        assert_eq!(expired.len(), 1);
        assert_eq!(pool.idle_count(&rt), 1);
    }

    #[tokio::test]
    async fn autoscale_grows_above_high_water() {
        let pool = pool();
        let rt = runtime();
        pool.configure(
            rt.clone(),
            PoolConfig {
                min: 1,
                max: 5,
                reuse_age_secs: 3600,
                high_water_percent: 50,
                low_water_percent: 10,
                scale_step: 2,
            },
        );
        pool.refill_to(&rt, 2, &spec(), 0).await.unwrap();
        pool.acquire(&rt).unwrap();
        pool.acquire(&rt).unwrap();

        assert_eq!(pool.autoscale_decision(&rt), AutoscaleAction::GrowTo(4));
    }

    #[tokio::test]
    async fn autoscale_shrinks_below_low_water() {
        let pool = pool();
        let rt = runtime();
        pool.configure(
            rt.clone(),
            PoolConfig {
                min: 1,
                max: 5,
                reuse_age_secs: 3600,
                high_water_percent: 90,
                low_water_percent: 20,
                scale_step: 2,
            },
        );
        pool.refill_to(&rt, 5, &spec(), 0).await.unwrap();

        assert_eq!(pool.autoscale_decision(&rt), AutoscaleAction::ShrinkTo(1));
    }

    #[tokio::test]
    async fn autoscale_is_stable_between_water_marks() {
        let pool = pool();
        let rt = runtime();
        pool.configure(
            rt.clone(),
            PoolConfig {
                min: 1,
                max: 10,
                reuse_age_secs: 3600,
                high_water_percent: 90,
                low_water_percent: 10,
                scale_step: 2,
            },
        );
        pool.refill_to(&rt, 4, &spec(), 0).await.unwrap();
        pool.acquire(&rt).unwrap();

        assert_eq!(pool.autoscale_decision(&rt), AutoscaleAction::None);
    }
}

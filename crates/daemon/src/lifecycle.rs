// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: file-path layout, process lock, startup (snapshot
//! load + WAL replay + socket bind), and graceful shutdown (flush + final
//! snapshot + cleanup). Mirrors the target's own single-process-per-host
//! discipline: one `devboxd` owns one state directory, guarded by an
//! exclusive lock file so a second instance refuses to start rather than
//! corrupting the WAL.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use devbox_core::{Config as RuntimeConfig, SystemClock, UuidIdGen};
use devbox_driver::{DockerDriver, MountPolicy, SandboxDriver, TracedDriver};
use devbox_engine::{EngineError, Ledger, MetricsSampler, Orchestrator, Scheduler, UsageMeter};
use devbox_storage::{MaterializedState, Snapshot, SnapshotError, Wal, WalError};
use parking_lot::Mutex;
use thiserror::Error;

use crate::auth::{StaticTokenVerifier, TokenVerifier};
use crate::broadcaster::CollaborationBroadcaster;
use crate::event_bus::{EventBus, EventReader};
use crate::telemetry::Metrics;

/// The default runtime key a fresh IDE connection is assigned against
/// absent any other selection. A future `auth` extension that lets the
/// client request a runtime would replace this constant with a lookup.
pub fn default_runtime() -> devbox_core::Runtime {
    devbox_core::Runtime::new("python", "3.11")
}

/// The concrete driver stack the daemon binary wires up: a traced
/// wrapper around the docker-CLI driver, matching the target's own
/// `TracedSession<TmuxAdapter>` composition (a generic `SandboxDriver`
/// observability layer over one concrete engine backend).
pub type DriverImpl = TracedDriver<DockerDriver>;

/// File-path layout for one daemon instance's state directory. Every
/// path the daemon touches on disk is named here, once.
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub admin_socket_path: PathBuf,
    pub ide_socket_path: PathBuf,
    pub lock_path: PathBuf,
    pub version_path: PathBuf,
    pub log_path: PathBuf,
    pub wal_path: PathBuf,
    pub snapshot_path: PathBuf,
}

impl Config {
    pub fn load(state_dir: PathBuf) -> Self {
        Self {
            admin_socket_path: state_dir.join("admin.sock"),
            ide_socket_path: state_dir.join("ide.sock"),
            lock_path: state_dir.join("devboxd.lock"),
            version_path: state_dir.join("devboxd.version"),
            log_path: state_dir.join("logs").join("devboxd.log"),
            wal_path: state_dir.join("devboxd.wal"),
            snapshot_path: state_dir.join("devboxd.snapshot"),
            state_dir,
        }
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine a state directory (set DEVBOX_STATE_DIR or HOME)")]
    NoStateDir,
    #[error("another devboxd instance holds the lock at {0}")]
    LockFailed(PathBuf),
    #[error("failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),
    #[error(transparent)]
    Wal(#[from] WalError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Runtime(#[from] EngineError),
    #[error("failed to initialize the metrics registry: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Everything one running daemon holds: the two sockets' accept state is
/// owned by [`crate::listener`], but the shared engine components and
/// materialized view live here so both the admin and IDE listeners, and
/// the timer-driven background loops, can reach them.
pub struct DaemonState {
    pub config: Config,
    pub runtime_config: RuntimeConfig,
    pub orchestrator: Arc<Orchestrator<DriverImpl, SystemClock, UuidIdGen>>,
    pub ledger: Arc<Ledger<SystemClock, UuidIdGen>>,
    pub scheduler: Arc<Mutex<Scheduler>>,
    pub broadcaster: Arc<CollaborationBroadcaster>,
    pub usage_meter: Arc<UsageMeter>,
    pub sampler: Arc<MetricsSampler<DriverImpl, SystemClock>>,
    pub metrics: Arc<Metrics>,
    pub token_verifier: Arc<dyn TokenVerifier>,
    pub state: Arc<Mutex<MaterializedState>>,
    pub event_bus: EventBus,
    lock_file: std::fs::File,
    start_time: Instant,
    next_processed_seq: AtomicU64,
}

impl DaemonState {
    /// Fold one already-persisted WAL entry into the materialized view
    /// and advance the processed-sequence watermark. Used both for the
    /// replay-at-startup path and for events appended live (`Emit`
    /// effects go through [`EventBus::send`] first; this is the
    /// "apply" half every entry eventually gets, exactly once ever, via
    /// `mark_processed`).
    pub fn apply_event(&self, event: &devbox_core::Event, seq: u64) {
        self.state.lock().apply_event(event);
        self.next_processed_seq.store(seq, Ordering::SeqCst);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Flush the WAL and, if any events have been processed since the
    /// last snapshot, write a fresh one. Called on the periodic
    /// checkpoint cadence and unconditionally during `shutdown`.
    pub fn checkpoint(&self) -> Result<(), LifecycleError> {
        self.event_bus.flush()?;
        let seq = self.next_processed_seq.load(Ordering::SeqCst);
        if seq > 0 {
            let snapshot = Snapshot::new(seq, self.state.lock().clone());
            snapshot.save(&self.config.snapshot_path)?;
        }
        Ok(())
    }

    /// Flush the WAL, write a final snapshot, and remove the sockets,
    /// lock, and version files so a subsequent `startup` doesn't find
    /// stale breadcrumbs from this process.
    pub fn shutdown(&self) -> Result<(), LifecycleError> {
        self.checkpoint()?;
        for path in [&self.config.admin_socket_path, &self.config.ide_socket_path, &self.config.version_path] {
            let _ = std::fs::remove_file(path);
        }
        drop_lock(&self.lock_file, &self.config.lock_path);
        Ok(())
    }
}

#[cfg(unix)]
fn drop_lock(file: &std::fs::File, path: &Path) {
    use fs2::FileExt;
    let _ = FileExt::unlock(file);
    let _ = std::fs::remove_file(path);
}

#[cfg(not(unix))]
fn drop_lock(_file: &std::fs::File, _path: &Path) {}

pub struct StartupResult {
    pub daemon: Arc<DaemonState>,
    pub event_reader: EventReader,
}

/// Resolve the state directory, create it if absent, and acquire the
/// instance lock. Split out of `startup` so the CLI's "is a daemon
/// running" check can reuse it without the rest of the bring-up.
pub fn acquire_lock(config: &Config) -> Result<std::fs::File, LifecycleError> {
    use fs2::FileExt;
    use std::io::{Seek, SeekFrom, Write};
    std::fs::create_dir_all(&config.state_dir)?;
    std::fs::create_dir_all(config.log_path.parent().unwrap_or(&config.state_dir))?;

    let mut lock_file = std::fs::OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| LifecycleError::LockFailed(config.lock_path.clone()))?;

    // Record our own pid in the (now-held) lock file so the `devbox` CLI
    // can find it to send a signal without a separate pidfile to keep in
    // sync.
    lock_file.set_len(0)?;
    lock_file.seek(SeekFrom::Start(0))?;
    write!(lock_file, "{}", std::process::id())?;
    lock_file.flush()?;

    Ok(lock_file)
}

/// Bring up one daemon instance: acquire the lock, load the last
/// snapshot (if any) and replay WAL entries written after it, and hand
/// back the wired-up engine components plus the reader the main loop
/// drains events from. Binding the sockets themselves is `listener`'s
/// job — `startup` only guarantees a consistent, durable state to bind
/// them against.
pub async fn startup(config: Config, runtime_config: RuntimeConfig) -> Result<StartupResult, LifecycleError> {
    let lock_file = acquire_lock(&config)?;

    std::fs::write(&config.version_path, env!("CARGO_PKG_VERSION"))?;

    let (state, start_seq) = match Snapshot::load(&config.snapshot_path)? {
        Some(snapshot) => (snapshot.state, snapshot.seq),
        None => (MaterializedState::default(), 0),
    };

    let mut wal = Wal::open(&config.wal_path, start_seq)?;
    let replay_state = Arc::new(Mutex::new(state));
    let mut replayed_seq = start_seq;
    for entry in wal.entries_after(start_seq)? {
        replay_state.lock().apply_event(&entry.event);
        replayed_seq = entry.seq;
    }
    wal.mark_processed(replayed_seq);

    let (event_bus, event_reader) = EventBus::new(wal);

    let driver = TracedDriver::new(DockerDriver::new(MountPolicy::default()));
    let spec_builder: Box<dyn devbox_engine::SpecBuilder> =
        Box::new(devbox_engine::FnSpecBuilder(default_spec_builder));
    let orchestrator = Arc::new(Orchestrator::new(
        driver,
        SystemClock,
        UuidIdGen,
        runtime_config.clone(),
        spec_builder,
    ));
    orchestrator.configure_pool(default_runtime(), runtime_config.default_pool);

    let ledger = Arc::new(Ledger::new(SystemClock, UuidIdGen));

    let usage_meter = Arc::new(UsageMeter::new(
        runtime_config.idle_cpu_threshold_percent,
        runtime_config.idle_mem_threshold_bytes,
        runtime_config.idle_duration_threshold(),
        runtime_config.baseline_mem_bytes,
        runtime_config.rate_table(),
    ));

    let sampler = Arc::new(MetricsSampler::new(
        TracedDriver::new(DockerDriver::new(MountPolicy::default())),
        SystemClock,
        runtime_config.sample_interval(),
        runtime_config.snapshot_ring_window(),
    ));

    let metrics = Arc::new(Metrics::new()?);

    let daemon = Arc::new(DaemonState {
        config,
        runtime_config,
        orchestrator,
        ledger,
        scheduler: Arc::new(Mutex::new(Scheduler::new())),
        broadcaster: Arc::new(CollaborationBroadcaster::new()),
        usage_meter,
        sampler,
        metrics,
        token_verifier: Arc::new(StaticTokenVerifier),
        state: replay_state,
        event_bus,
        lock_file,
        start_time: Instant::now(),
        next_processed_seq: AtomicU64::new(replayed_seq),
    });

    Ok(StartupResult { daemon, event_reader })
}

/// Default sandbox image/command selection for a runtime key, absent any
/// per-deployment override. Mount layout and security profile follow the
/// workspace convention (`MountPolicy::default`, `SecurityProfile::locked_down`).
fn default_spec_builder(
    runtime: &devbox_core::Runtime,
    environment_class: devbox_core::EnvironmentClass,
) -> devbox_driver::SandboxSpec {
    devbox_driver::SandboxSpec::new(
        format!("devbox/{}:{}", runtime.language, runtime.version),
        vec!["/bin/sh".to_string()],
        environment_class.default_limits(),
        devbox_core::SecurityProfile::locked_down("default"),
    )
    .with_mounts(vec![devbox_driver::Mount {
        source: "/workspaces".to_string(),
        target: "/workspace".to_string(),
        readonly: false,
    }])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn startup_then_shutdown_leaves_no_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().to_path_buf());

        let result = startup(config.clone(), RuntimeConfig::default()).await.unwrap();
        assert_eq!(result.daemon.uptime_secs(), 0);

        result.daemon.shutdown().unwrap();
        assert!(!config.lock_path.exists());
        assert!(config.wal_path.exists(), "wal itself is retained, only breadcrumbs are cleaned");
    }

    #[tokio::test]
    async fn a_second_startup_against_a_held_lock_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().to_path_buf());
        let _first = startup(config.clone(), RuntimeConfig::default()).await.unwrap();

        let second = startup(config, RuntimeConfig::default()).await;
        assert!(matches!(second, Err(LifecycleError::LockFailed(_))));
    }

    #[tokio::test]
    async fn checkpoint_then_restart_replays_through_the_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().to_path_buf());
        let result = startup(config.clone(), RuntimeConfig::default()).await.unwrap();

        let (_, sandbox, effects) = result
            .daemon
            .orchestrator
            .assign(
                devbox_core::UserId::new("u"),
                devbox_core::ProjectId::new("p"),
                devbox_core::Runtime::new("python", "3.11"),
                devbox_core::EnvironmentClass::Development,
                false,
            )
            .await
            .unwrap();
        for effect in effects {
            if let devbox_core::Effect::Emit { event } = effect {
                let seq = result.daemon.event_bus.send(event.clone()).unwrap();
                result.daemon.apply_event(&event, seq);
            }
        }
        result.daemon.checkpoint().unwrap();
        result.daemon.shutdown().unwrap();

        let restarted = startup(config, RuntimeConfig::default()).await.unwrap();
        assert!(restarted.daemon.state.lock().get_sandbox(sandbox.id.as_str()).is_some());
    }
}

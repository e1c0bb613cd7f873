// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! devboxd: background process that owns one tenant host's sandboxes,
//! the credits ledger, and the IDE multiplexer (§1, §4).
//!
//! Architecture:
//! - Admin listener ([`listener`]): request/response IPC for the `devbox` CLI.
//! - IDE listener ([`mux`]): persistent per-connection multiplexer sessions.
//! - Engine loop: processes durable events sequentially from the WAL,
//!   drains fired timers, and dispatches background sweeps (rollover,
//!   heartbeat staleness) that don't fit the per-session timer model.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::sync::Arc;
use std::time::Duration;

use devbox_core::{AccountId, Config as RuntimeConfig, SandboxState, SystemClock, TerminationCause, UuidIdGen};
use devbox_daemon::connection::ConnectionManager;
use devbox_daemon::effects::{ConnectionRegistry, EffectSink};
use devbox_daemon::lifecycle::{self, LifecycleError};
use devbox_daemon::listener::{AdminCtx, AdminListener};
use devbox_daemon::multiplex::CloseCode;
use devbox_daemon::mux::{IdeCtx, IdeListener};
use devbox_daemon::{Config, DaemonState};
use rust_decimal::Decimal;
use tokio::net::UnixListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

type Sink = EffectSink<devbox_daemon::lifecycle::DriverImpl, SystemClock, UuidIdGen>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("devboxd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("devboxd {}", env!("CARGO_PKG_VERSION"));
                println!("Sandbox orchestrator, usage meter, and IDE multiplexer daemon");
                println!();
                println!("USAGE:");
                println!("    devboxd");
                println!();
                println!("devboxd is typically started by the `devbox` CLI and should not");
                println!("be invoked directly. It listens on two Unix sockets: one for the");
                println!("admin protocol (`devbox` commands), one for IDE clients.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: devboxd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let state_dir = devbox_daemon::env::state_dir()?;
    let config = Config::load(state_dir);
    let runtime_config = load_runtime_config()?;

    rotate_log_if_needed(&config.log_path);
    write_startup_marker(&config)?;
    let log_guard = setup_logging(&config.log_path)?;

    info!("starting devboxd");

    let lifecycle::StartupResult { daemon, mut event_reader } = match lifecycle::startup(config.clone(), runtime_config).await {
        Ok(r) => r,
        Err(LifecycleError::LockFailed(path)) => {
            eprintln!("devboxd is already running");
            eprintln!("  lock: {}", path.display());
            if let Ok(version) = std::fs::read_to_string(&config.version_path) {
                let version = version.trim();
                if !version.is_empty() {
                    eprintln!("  version: {version}");
                }
            }
            std::process::exit(1);
        }
        Err(e) => {
            write_startup_error(&config, &e);
            error!("failed to start daemon: {e}");
            drop(log_guard);
            return Err(e.into());
        }
    };

    let shutdown_notify = Arc::new(Notify::new());
    let connections = Arc::new(ConnectionManager::new());
    let effects: Arc<Sink> = Arc::new(EffectSink::new(
        Arc::clone(&daemon.orchestrator),
        Arc::clone(&daemon.ledger),
        Arc::clone(&daemon.scheduler),
        SystemClock,
        daemon.event_bus.clone(),
        Arc::clone(&connections) as Arc<dyn ConnectionRegistry>,
        Arc::clone(&daemon.metrics),
    ));

    let admin_ctx = Arc::new(AdminCtx {
        daemon: Arc::clone(&daemon),
        effects: Arc::clone(&effects),
        connections: Arc::clone(&connections),
        shutdown: Arc::clone(&shutdown_notify),
    });
    let admin_socket = bind_socket(&daemon.config.admin_socket_path)?;
    tokio::spawn(AdminListener::new(admin_socket, admin_ctx).run());

    let ide_ctx = Arc::new(IdeCtx {
        daemon: Arc::clone(&daemon),
        effects: Arc::clone(&effects),
        connections: Arc::clone(&connections),
    });
    let ide_socket = bind_socket(&daemon.config.ide_socket_path)?;
    tokio::spawn(IdeListener::new(ide_socket, ide_ctx).run());

    let background_token = CancellationToken::new();

    spawn_health_loop(Arc::clone(&daemon), background_token.clone());
    spawn_autoscale_loop(Arc::clone(&daemon), background_token.clone());
    spawn_sample_drain(Arc::clone(&daemon), Arc::clone(&effects));
    spawn_rollover_sweep(Arc::clone(&daemon), Arc::clone(&effects), background_token.clone());
    spawn_heartbeat_sweep(Arc::clone(&daemon), Arc::clone(&connections), background_token.clone());
    spawn_metrics_sweep(Arc::clone(&daemon), background_token.clone());
    spawn_flush_task(daemon.event_bus.clone());
    spawn_checkpoint_task(Arc::clone(&daemon));

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(
        admin = %daemon.config.admin_socket_path.display(),
        ide = %daemon.config.ide_socket_path.display(),
        "devboxd ready"
    );
    println!("READY");

    let mut timer_check = tokio::time::interval(timer_check_interval());

    loop {
        tokio::select! {
            result = event_reader.recv() => {
                match result {
                    Ok(Some(entry)) => {
                        daemon.apply_event(&entry.event, entry.seq);
                        event_reader.mark_processed(entry.seq);
                    }
                    Ok(None) => {
                        info!("event bus closed, shutting down");
                        break;
                    }
                    Err(e) => error!("error reading from WAL: {e}"),
                }
            }

            _ = shutdown_notify.notified() => {
                info!("shutdown requested via admin command");
                break;
            }

            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }

            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }

            _ = timer_check.tick() => {
                dispatch_fired_timers(&daemon, &effects).await;
            }
        }
    }

    background_token.cancel();
    if let Err(e) = daemon.shutdown() {
        error!("error during shutdown: {e}");
    }
    info!("devboxd stopped");
    Ok(())
}

fn load_runtime_config() -> Result<RuntimeConfig, LifecycleError> {
    let config_path = devbox_daemon::env::config_path();
    RuntimeConfig::load(config_path.as_deref()).map_err(|e| LifecycleError::Io(std::io::Error::other(e.to_string())))
}

fn bind_socket(path: &std::path::Path) -> Result<UnixListener, LifecycleError> {
    let _ = std::fs::remove_file(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    UnixListener::bind(path).map_err(|e| LifecycleError::BindFailed(path.to_path_buf(), e))
}

fn spawn_health_loop(daemon: Arc<DaemonState>, token: CancellationToken) {
    tokio::spawn(async move {
        daemon
            .orchestrator
            .run_health_loop(token, {
                let daemon = Arc::clone(&daemon);
                move || {
                    daemon
                        .state
                        .lock()
                        .sandboxes
                        .values()
                        .filter(|s| s.state != SandboxState::Gone)
                        .map(|s| s.id.clone())
                        .collect()
                }
            })
            .await;
    });
}

/// Autoscale cadence. No field in [`RuntimeConfig`] names this directly —
/// pool growth/shrink decisions are cheap to evaluate, so a fixed
/// 30-second tick is used rather than adding a config knob for it.
const AUTOSCALE_TICK: Duration = Duration::from_secs(30);

fn spawn_autoscale_loop(daemon: Arc<DaemonState>, token: CancellationToken) {
    tokio::spawn(async move {
        let keys = {
            let daemon = Arc::clone(&daemon);
            move || daemon.orchestrator.configured_runtimes()
        };
        daemon.orchestrator.run_autoscale_loop(token, keys, AUTOSCALE_TICK).await;
    });
}

/// Drain sampled [`devbox_core::ResourceSnapshot`]s into the usage meter,
/// tracking each session's previous snapshot timestamp locally —
/// `UsageMeter::observe` takes it as a parameter rather than tracking it
/// itself, since the sampler is the only thing that knows the cadence.
fn spawn_sample_drain(daemon: Arc<DaemonState>, effects: Arc<Sink>) {
    tokio::spawn(async move {
        let mut rx = daemon.sampler.subscribe();
        let mut prev_ts_ms: std::collections::HashMap<devbox_core::SessionId, u64> = std::collections::HashMap::new();
        while let Some((session_id, snapshot)) = rx.recv().await {
            let prev = *prev_ts_ms.get(&session_id).unwrap_or(&snapshot.ts_ms);
            if let Some(outcome) = daemon.usage_meter.observe(&session_id, &snapshot, prev) {
                match outcome.transition {
                    devbox_engine::IdleTransition::BecameIdle => {
                        info!(session = %session_id, "session became idle");
                    }
                    devbox_engine::IdleTransition::BecameActive => {
                        info!(session = %session_id, "session became active");
                    }
                    devbox_engine::IdleTransition::None => {}
                }
            }
            prev_ts_ms.insert(session_id, snapshot.ts_ms);
            let _ = &effects;
        }
    });
}

/// Monthly rollover runs as its own sweep rather than through per-account
/// `TimerId`s — `TimerId` has no account-scoped extractor, only a
/// session-scoped one, so there is nothing for the timer-check loop to
/// dispatch against.
const ROLLOVER_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

fn spawn_rollover_sweep(daemon: Arc<DaemonState>, effects: Arc<Sink>, token: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(ROLLOVER_SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = interval.tick() => {
                    let accounts: Vec<String> = daemon.state.lock().accounts.keys().cloned().collect();
                    for account in accounts {
                        let account_id = AccountId::new(account);
                        match daemon.ledger.monthly_rollover(&account_id) {
                            Ok((_tx, account_effects)) => {
                                if let Err(e) = effects.apply(account_effects).await {
                                    warn!(account = %account_id, "failed to apply rollover effects: {e}");
                                }
                            }
                            Err(e) => warn!(account = %account_id, "rollover failed: {e}"),
                        }
                    }
                }
            }
        }
    });
}

/// Heartbeat staleness is a bulk sweep over [`ConnectionManager`] rather
/// than a `TimerId` per connection — the registry already exposes the
/// exact bulk query this needs.
const HEARTBEAT_SWEEP_INTERVAL: Duration = Duration::from_secs(15);

fn spawn_heartbeat_sweep(daemon: Arc<DaemonState>, connections: Arc<ConnectionManager>, token: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEARTBEAT_SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = interval.tick() => {
                    let now_ms = now_ms();
                    let timeout_ms = daemon.runtime_config.heartbeat_timeout().as_millis() as u64;
                    for connection in connections.stale_connections(now_ms, timeout_ms) {
                        connections
                            .close_connection(&connection, CloseCode::Stale.code(), "heartbeat timeout")
                            .await;
                    }
                }
            }
        }
    });
}

/// Keeps the `pool_size{key}` gauge current — the orchestrator's pool
/// occupancy isn't event-driven, so this polls it on the same cadence as
/// the autoscale loop rather than trying to hook every refill/evict site.
const METRICS_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

fn spawn_metrics_sweep(daemon: Arc<DaemonState>, token: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(METRICS_SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = interval.tick() => {
                    for (runtime, idle, _assigned) in daemon.orchestrator.pool_status() {
                        daemon.metrics.set_pool_size(&runtime.to_string(), idle);
                    }
                }
            }
        }
    });
}

/// The custom timer-check dispatch loop only handles `idle-check:` and
/// `credit-commit:` prefixed timers — the only two `TimerId` variants
/// with a session-scoped extractor. `health-probe` is driven entirely by
/// [`devbox_engine::Orchestrator::run_health_loop`] (which also means the
/// `health-probe` `StartTimer` effect `assign()` pushes into the
/// scheduler is never dispatched by prefix here; it sits as harmless
/// dead state until the session it belongs to is reaped and its timers
/// cancelled). `pool-refill`/`pool-evict` are likewise owned by
/// `run_autoscale_loop`.
async fn dispatch_fired_timers(daemon: &Arc<DaemonState>, effects: &Arc<Sink>) {
    let fired = {
        let mut scheduler = daemon.scheduler.lock();
        scheduler.fired_timers(std::time::Instant::now())
    };
    for timer in fired {
        if timer.is_idle_check() {
            dispatch_idle_check(daemon, effects, &timer).await;
        } else if timer.is_credit_commit() {
            dispatch_credit_commit(daemon, effects, &timer).await;
        }
    }
}

async fn dispatch_idle_check(daemon: &Arc<DaemonState>, effects: &Arc<Sink>, timer: &devbox_core::TimerId) {
    let Some(session_id_str) = timer.session_id_str() else { return };
    let session_id = devbox_core::SessionId::new(session_id_str);

    if !daemon.usage_meter.is_idle(&session_id) {
        daemon
            .scheduler
            .lock()
            .set_timer(timer.clone(), daemon.runtime_config.sample_interval(), std::time::Instant::now());
        return;
    }

    let Some(session) = daemon.orchestrator.session(&session_id) else { return };
    let final_cost = daemon.usage_meter.take_pending_cost(&session_id).unwrap_or(Decimal::ZERO);
    match daemon
        .orchestrator
        .reap(&session_id, TerminationCause::Idle, final_cost, session.user_ref.clone())
        .await
    {
        Ok(reap_effects) => {
            if let Err(e) = effects.apply(reap_effects).await {
                warn!(session = %session_id, "failed to apply idle reap effects: {e}");
            }
        }
        Err(e) => warn!(session = %session_id, "idle reap failed: {e}"),
    }
}

async fn dispatch_credit_commit(daemon: &Arc<DaemonState>, effects: &Arc<Sink>, timer: &devbox_core::TimerId) {
    let Some(session_id_str) = timer.session_id_str() else { return };
    let session_id = devbox_core::SessionId::new(session_id_str);

    if let Some(session) = daemon.orchestrator.session(&session_id) {
        if let Some(cost) = daemon.usage_meter.take_pending_cost(&session_id) {
            if cost > Decimal::ZERO {
                let commit = devbox_core::Effect::CommitUsage {
                    account: AccountId::new(session.user_ref.as_str()),
                    amount: cost,
                    reference: Some(session_id.to_string()),
                };
                if let Err(e) = effects.apply(vec![commit]).await {
                    warn!(session = %session_id, "failed to commit accrued usage: {e}");
                }
            }
        }
        daemon.scheduler.lock().set_timer(
            timer.clone(),
            daemon.runtime_config.credit_commit_interval(),
            std::time::Instant::now(),
        );
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn timer_check_interval() -> Duration {
    devbox_daemon::env::timer_check_ms().unwrap_or(Duration::from_secs(1))
}

const FLUSH_INTERVAL: Duration = Duration::from_millis(10);

fn spawn_flush_task(event_bus: devbox_daemon::EventBus) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(FLUSH_INTERVAL);
        loop {
            interval.tick().await;
            if event_bus.needs_flush() {
                if let Err(e) = event_bus.flush() {
                    error!("failed to flush event bus: {e}");
                }
            }
        }
    });
}

const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(60);

fn spawn_checkpoint_task(daemon: Arc<DaemonState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CHECKPOINT_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = daemon.checkpoint() {
                warn!("periodic checkpoint failed: {e}");
            }
        }
    });
}

const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;
const MAX_ROTATED_LOGS: u32 = 3;

fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }
    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

const STARTUP_MARKER_PREFIX: &str = "--- devboxd: starting (pid: ";

fn write_startup_marker(config: &Config) -> Result<(), LifecycleError> {
    use std::io::Write;
    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&config.log_path)?;
    writeln!(file, "{}{}) ---\n", STARTUP_MARKER_PREFIX, std::process::id())?;
    Ok(())
}

fn write_startup_error(config: &Config, error: &LifecycleError) {
    use std::io::Write;
    let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(&config.log_path) else {
        return;
    };
    let _ = writeln!(file, "ERROR failed to start daemon: {error}");
}

fn setup_logging(log_path: &std::path::Path) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file_appender = tracing_appender::rolling::never(
        log_path.parent().ok_or(LifecycleError::NoStateDir)?,
        log_path.file_name().ok_or(LifecycleError::NoStateDir)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(guard)
}

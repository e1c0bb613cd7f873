// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The IDE Multiplexer (§4.7): the real tenant-facing workload this
//! process serves. One connection on `config.ide_socket_path` is one
//! IDE client; its first frame MUST be `auth`, which binds it to a
//! fresh session and sandbox via [`devbox_engine::Orchestrator::assign`].
//! Every following frame is dispatched against that sandbox until the
//! client disconnects or a background sweep (heartbeat staleness, a
//! `CloseConnection` effect from a sandbox reap) ends it first.
//!
//! A dropped connection does not itself reap the session — the sandbox
//! stays warm so a client that drops and reconnects doesn't pay a cold
//! start, and the usual idle-timeout/credit-exhaustion paths in
//! [`devbox_engine::UsageMeter`] reap it on their own schedule.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use devbox_core::{ConnectionId, EnvironmentClass, IdGen, IdeConnection, ProjectId, PtyId, UuidIdGen, WatcherId};
use devbox_driver::{Chunk, SandboxDriver, SandboxHandle};
use thiserror::Error;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::auth::AuthError;
use crate::connection::ConnectionManager;
use crate::effects::EffectSink;
use crate::lifecycle::{default_runtime, DaemonState, DriverImpl};
use crate::multiplex::{ClientInfo, ClientMessage, CloseCode, FileEventKind, FileMeta, ServerMessage, SyncMode};
use crate::protocol::{self, ProtocolError};

type Sink = EffectSink<DriverImpl, devbox_core::SystemClock, devbox_core::UuidIdGen>;

/// How long a fresh connection gets to send its `auth` frame before the
/// multiplexer gives up on it.
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a single outbound frame gets before its recipient is judged
/// a slow client (§5 `slow_client`, §6 close code 4004).
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared context every IDE connection handler reads from.
pub struct IdeCtx {
    pub daemon: Arc<DaemonState>,
    pub effects: Arc<Sink>,
    pub connections: Arc<ConnectionManager>,
}

/// Accepts connections on the IDE socket, handing each to its own
/// spawned task immediately — one connection never blocks another from
/// being accepted (§4.7).
pub struct IdeListener {
    socket: UnixListener,
    ctx: Arc<IdeCtx>,
}

impl IdeListener {
    pub fn new(socket: UnixListener, ctx: Arc<IdeCtx>) -> Self {
        Self { socket, ctx }
    }

    pub async fn run(self) {
        loop {
            match self.socket.accept().await {
                Ok((stream, _)) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        handle_connection(stream, ctx).await;
                    });
                }
                Err(e) => error!("ide socket accept error: {e}"),
            }
        }
    }
}

#[derive(Debug, Error)]
enum MuxError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Engine(#[from] devbox_engine::EngineError),
    #[error(transparent)]
    Driver(#[from] devbox_driver::DriverError),
    #[error(transparent)]
    Effect(#[from] crate::effects::EffectError),
}

/// State an authenticated connection's dispatch loop closes over.
struct Session {
    connection_id: ConnectionId,
    project: ProjectId,
    session_id: devbox_core::SessionId,
    sandbox_handle: SandboxHandle,
    writer: mpsc::Sender<ServerMessage>,
}

async fn handle_connection(stream: UnixStream, ctx: Arc<IdeCtx>) {
    let (mut reader, mut writer) = stream.into_split();

    let first = match tokio::time::timeout(AUTH_TIMEOUT, protocol::read_message(&mut reader)).await {
        Ok(Ok(bytes)) => protocol::decode::<ClientMessage>(&bytes),
        Ok(Err(e)) => Err(e),
        Err(_) => {
            debug!("ide connection dropped: no auth frame within {AUTH_TIMEOUT:?}");
            return;
        }
    };

    let ClientMessage::Auth { token, project, client } = (match first {
        Ok(msg) => msg,
        Err(e) => {
            debug!("ide connection dropped before a decodable auth frame: {e}");
            return;
        }
    }) else {
        let _ = protocol::write_typed(&mut writer, &ServerMessage::closed(CloseCode::AuthRequired), WRITE_TIMEOUT).await;
        return;
    };

    let user = match ctx.daemon.token_verifier.verify(&token).await {
        Ok(user) => user,
        Err(AuthError::InvalidToken) => {
            let _ = protocol::write_typed(&mut writer, &ServerMessage::closed(CloseCode::InvalidToken), WRITE_TIMEOUT).await;
            return;
        }
    };
    let project = ProjectId::new(project);
    info!(%user, %project, client = ?client, "ide client authenticated");

    let (session, writer_rx) = match bind_session(&ctx, &mut writer, user, project.clone(), client).await {
        Ok(s) => s,
        Err(e) => {
            warn!("failed to bind ide connection to a sandbox: {e}");
            let _ = protocol::write_typed(&mut writer, &ServerMessage::Error { message: e.to_string() }, WRITE_TIMEOUT).await;
            return;
        }
    };

    let writer_task = spawn_writer(writer, writer_rx);

    run_dispatch_loop(&ctx, &mut reader, &session).await;

    writer_task.abort();
    ctx.daemon.broadcaster.leave(&session.project, &session.connection_id);
    ctx.connections.unregister(&session.connection_id);
    info!(connection = %session.connection_id, "ide connection closed");
}

async fn bind_session(
    ctx: &IdeCtx,
    writer: &mut tokio::net::unix::OwnedWriteHalf,
    user: devbox_core::UserId,
    project: ProjectId,
    client: ClientInfo,
) -> Result<(Session, mpsc::Receiver<ServerMessage>), MuxError> {
    let connection_id = ConnectionId::new(UuidIdGen.next());
    let core = IdeConnection::new(
        connection_id.clone(),
        user.clone(),
        project.clone(),
        devbox_core::ClientDescriptor {
            kind: client.kind,
            version: client.version,
            capabilities: client.capabilities,
        },
        now_ms(),
    );
    let rx = ctx.connections.register(core, ctx.daemon.runtime_config.writer_queue_capacity);
    let tx = ctx
        .connections
        .writer(&connection_id)
        .expect("connection was just registered");

    let environment_class = EnvironmentClass::Development;
    let assign_started = std::time::Instant::now();
    let (session, sandbox, effects) = ctx
        .daemon
        .orchestrator
        .assign(user, project.clone(), default_runtime(), environment_class, false)
        .await?;
    ctx.daemon.metrics.record_sandbox_created(assign_started.elapsed());
    ctx.effects.apply(effects).await?;

    ctx.connections.bind_sandbox(&connection_id, sandbox.id.clone());
    ctx.daemon.broadcaster.join(project.clone(), connection_id.clone(), tx.clone());
    ctx.daemon.usage_meter.register(session.id.clone(), environment_class);

    let sandbox_handle = SandboxHandle::new(sandbox.id.clone(), sandbox.engine_handle.clone());
    ctx.daemon.sampler.register(session.id.clone(), sandbox_handle.clone());

    protocol::write_typed(
        writer,
        &ServerMessage::AuthAck {
            session_id: session.id.to_string(),
            server_capabilities: vec![
                "file_read".into(),
                "file_write".into(),
                "file_watch".into(),
                "terminal".into(),
                "sync".into(),
            ],
        },
        WRITE_TIMEOUT,
    )
    .await?;

    Ok((
        Session {
            connection_id,
            project,
            session_id: session.id,
            sandbox_handle,
            writer: tx,
        },
        rx,
    ))
}

fn spawn_writer(
    mut writer: tokio::net::unix::OwnedWriteHalf,
    mut rx: mpsc::Receiver<ServerMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, ServerMessage::Closed { .. });
            match tokio::time::timeout(WRITE_TIMEOUT, protocol::write_typed(&mut writer, &msg, WRITE_TIMEOUT)).await {
                Ok(Ok(())) => {}
                _ => break,
            }
            if closing {
                break;
            }
        }
    })
}

async fn run_dispatch_loop(ctx: &IdeCtx, reader: &mut tokio::net::unix::OwnedReadHalf, session: &Session) {
    loop {
        let bytes = match protocol::read_message(reader).await {
            Ok(b) => b,
            Err(ProtocolError::ConnectionClosed) => break,
            Err(e) => {
                debug!(connection = %session.connection_id, "ide read error: {e}");
                break;
            }
        };
        let msg: ClientMessage = match protocol::decode(&bytes) {
            Ok(m) => m,
            Err(e) => {
                let _ = session.writer.send(ServerMessage::Error { message: e.to_string() }).await;
                continue;
            }
        };
        if let Err(e) = dispatch(ctx, session, msg).await {
            warn!(connection = %session.connection_id, session = %session.session_id, "ide dispatch error: {e}");
            let _ = session.writer.send(ServerMessage::Error { message: e.to_string() }).await;
        }
    }
}

async fn dispatch(ctx: &IdeCtx, session: &Session, msg: ClientMessage) -> Result<(), MuxError> {
    match msg {
        ClientMessage::Auth { .. } => {
            let _ = session
                .writer
                .send(ServerMessage::Error { message: "already authenticated".to_string() })
                .await;
            Ok(())
        }
        ClientMessage::FileRead { path } => file_read(ctx, session, path).await,
        ClientMessage::FileWrite { path, bytes, encoding } => file_write(ctx, session, path, bytes, encoding).await,
        ClientMessage::FileWatch { patterns } => {
            file_watch(ctx, session, patterns);
            Ok(())
        }
        ClientMessage::TerminalCreate { shell, env, cwd, rows, cols } => {
            terminal_create(ctx, session, shell, env, cwd, rows, cols).await
        }
        ClientMessage::TerminalData { terminal_id, bytes } => terminal_data(ctx, session, terminal_id, bytes).await,
        ClientMessage::TerminalResize { terminal_id, rows, cols } => {
            terminal_resize(ctx, session, terminal_id, rows, cols).await
        }
        ClientMessage::LspRequest { id, .. } => {
            session
                .writer
                .send(ServerMessage::LspResponse {
                    id,
                    result: None,
                    error: Some(serde_json::json!({"message": "no language server is attached to this sandbox"})),
                })
                .await
                .ok();
            Ok(())
        }
        ClientMessage::DapRequest { seq, .. } => {
            session
                .writer
                .send(ServerMessage::DapResponse { request_seq: seq, success: false, body: None })
                .await
                .ok();
            Ok(())
        }
        ClientMessage::SyncRequest { mode, since } => sync_request(ctx, session, mode, since).await,
        ClientMessage::Heartbeat { ts } => {
            ctx.connections.record_heartbeat(&session.connection_id, now_ms());
            let _ = session.writer.send(ServerMessage::HeartbeatAck { ts }).await;
            Ok(())
        }
    }
}

async fn file_read(ctx: &IdeCtx, session: &Session, path: String) -> Result<(), MuxError> {
    let bytes = ctx.daemon.orchestrator.driver().get_archive(&session.sandbox_handle, &path).await?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    let _ = session
        .writer
        .send(ServerMessage::FileContent { path, bytes: encoded, encoding: "base64".to_string() })
        .await;
    Ok(())
}

async fn file_write(ctx: &IdeCtx, session: &Session, path: String, bytes: String, encoding: String) -> Result<(), MuxError> {
    if encoding != "base64" {
        let _ = session
            .writer
            .send(ServerMessage::Error { message: format!("unsupported file encoding: {encoding}") })
            .await;
        return Ok(());
    }
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(bytes)
        .map_err(|e| devbox_driver::DriverError::Protocol(e.to_string()))?;
    ctx.daemon
        .orchestrator
        .driver()
        .put_archive(&session.sandbox_handle, &path, decoded)
        .await?;
    let _ = session.writer.send(ServerMessage::FileWritten { path: path.clone() }).await;
    ctx.daemon.broadcaster.publish(
        &session.project,
        ServerMessage::FileChanged { path, originator: session.connection_id.to_string(), ts: now_ms() },
        &session.connection_id,
    );
    Ok(())
}

/// Watch the host-side workspace directory backing this project's
/// sandbox mount (§4.1 default mount: `/workspaces` -> `/workspace`).
/// There is no in-container inotify plumbed through the driver's exec
/// surface, so host-side watching is the honest boundary of what this
/// multiplexer can observe.
fn file_watch(ctx: &IdeCtx, session: &Session, patterns: Vec<String>) {
    let watch_dir = project_workspace_dir(&ctx.daemon.config.state_dir, &session.project);
    if std::fs::create_dir_all(&watch_dir).is_err() {
        return;
    }
    let watcher_id = WatcherId::new(UuidIdGen.next());
    let writer = session.writer.clone();
    let dir = watch_dir.clone();
    let task = tokio::task::spawn_blocking(move || run_file_watcher(writer, dir, patterns));
    ctx.connections.register_watcher(&session.connection_id, watcher_id, task);
}

fn run_file_watcher(writer: mpsc::Sender<ServerMessage>, watch_dir: PathBuf, patterns: Vec<String>) {
    use notify::{RecursiveMode, Watcher};

    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = match notify::recommended_watcher(tx) {
        Ok(w) => w,
        Err(e) => {
            warn!("file watcher setup failed: {e}");
            return;
        }
    };
    if watcher.watch(&watch_dir, RecursiveMode::Recursive).is_err() {
        return;
    }

    for res in rx {
        let Ok(event) = res else { continue };
        let Some(kind) = translate_event_kind(&event.kind) else { continue };
        for path in event.paths {
            let Ok(rel) = path.strip_prefix(&watch_dir) else { continue };
            let rel_str = rel.to_string_lossy().to_string();
            if !patterns.is_empty() && !patterns.iter().any(|p| glob_matches(p, &rel_str)) {
                continue;
            }
            let msg = ServerMessage::FileEvent { kind, path: rel_str, ts: now_ms() };
            if writer.blocking_send(msg).is_err() {
                return;
            }
        }
    }
}

fn translate_event_kind(kind: &notify::EventKind) -> Option<FileEventKind> {
    use notify::EventKind::*;
    match kind {
        Create(_) => Some(FileEventKind::Created),
        Modify(_) => Some(FileEventKind::Modified),
        Remove(_) => Some(FileEventKind::Removed),
        _ => None,
    }
}

/// A deliberately simple glob: `*` matches any run of characters,
/// everything else is literal. Good enough for the common `*.rs` /
/// `src/**` patterns IDE clients actually send; a real glob crate would
/// be warranted if the pattern language grew past that.
fn glob_matches(pattern: &str, candidate: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix('*') {
        return candidate.ends_with(suffix);
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return candidate.starts_with(prefix);
    }
    candidate == pattern
}

async fn terminal_create(
    ctx: &IdeCtx,
    session: &Session,
    shell: String,
    _env: std::collections::HashMap<String, String>,
    _cwd: Option<String>,
    rows: u16,
    cols: u16,
) -> Result<(), MuxError> {
    let mut pty = ctx
        .daemon
        .orchestrator
        .driver()
        .open_pty(&session.sandbox_handle, cols, rows, &shell)
        .await?;
    let output = pty.take_output();
    let terminal_id = PtyId::new(UuidIdGen.next());
    ctx.connections.register_pty(&session.connection_id, terminal_id.clone(), pty);
    spawn_pty_reader(output, session.writer.clone(), terminal_id.clone());

    let _ = session
        .writer
        .send(ServerMessage::TerminalCreated { terminal_id: terminal_id.to_string() })
        .await;
    Ok(())
}

fn spawn_pty_reader(
    mut output: mpsc::Receiver<Result<Chunk, devbox_driver::DriverError>>,
    writer: mpsc::Sender<ServerMessage>,
    terminal_id: PtyId,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(chunk) = output.recv().await {
            match chunk {
                Ok(Chunk::Bytes(bytes)) => {
                    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                    if writer
                        .send(ServerMessage::TerminalOutput { terminal_id: terminal_id.to_string(), bytes: encoded })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(Chunk::Eof) => break,
                Err(e) => {
                    debug!(%terminal_id, "pty output stream ended: {e}");
                    break;
                }
            }
        }
    })
}

async fn terminal_data(ctx: &IdeCtx, session: &Session, terminal_id: String, bytes: String) -> Result<(), MuxError> {
    let terminal = PtyId::new(terminal_id);
    let Some(input) = ctx.connections.pty_input_tx(&session.connection_id, &terminal) else {
        let _ = session
            .writer
            .send(ServerMessage::Error { message: format!("unknown terminal {terminal}") })
            .await;
        return Ok(());
    };
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(bytes)
        .map_err(|e| devbox_driver::DriverError::Protocol(e.to_string()))?;
    let _ = input.send(decoded).await;
    Ok(())
}

async fn terminal_resize(ctx: &IdeCtx, session: &Session, terminal_id: String, rows: u16, cols: u16) -> Result<(), MuxError> {
    let terminal = PtyId::new(terminal_id);
    if let Some(resize) = ctx.connections.pty_resize_tx(&session.connection_id, &terminal) {
        let _ = resize.send((cols, rows)).await;
    }
    Ok(())
}

/// `sync_request` lists the host-side workspace directory rather than
/// round-tripping through the driver's single-file archive calls —
/// there is no directory-listing operation on [`devbox_driver::SandboxDriver`]
/// (§9 treats exec/archive as the only filesystem seam), so the host
/// mount source is the only place a whole-tree listing can come from.
async fn sync_request(ctx: &IdeCtx, session: &Session, _mode: SyncMode, since: Option<u64>) -> Result<(), MuxError> {
    let dir = project_workspace_dir(&ctx.daemon.config.state_dir, &session.project);
    let mut files = Vec::new();
    if dir.exists() {
        collect_files(&dir, &dir, since, &mut files);
    }
    let _ = session.writer.send(ServerMessage::SyncResponse { files }).await;
    Ok(())
}

fn collect_files(root: &Path, dir: &Path, since: Option<u64>, out: &mut Vec<FileMeta>) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(metadata) = entry.metadata() else { continue };
        if metadata.is_dir() {
            collect_files(root, &path, since, out);
            continue;
        }
        let modified_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        if let Some(since) = since {
            if modified_ms < since {
                continue;
            }
        }
        let Ok(rel) = path.strip_prefix(root) else { continue };
        out.push(FileMeta {
            path: rel.to_string_lossy().to_string(),
            size_bytes: metadata.len(),
            modified_ms,
            is_dir: false,
        });
    }
}

fn project_workspace_dir(state_dir: &Path, project: &ProjectId) -> PathBuf {
    state_dir.join("workspaces").join(project.as_str())
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

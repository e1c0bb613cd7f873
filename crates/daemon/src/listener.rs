// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admin IPC listener (§4.12): accepts connections from the `devbox` CLI
//! over `config.admin_socket_path`, reads exactly one [`AdminRequest`]
//! per connection, dispatches it against the live [`DaemonState`], and
//! writes back exactly one [`AdminResponse`]. This is an operator
//! debugging aid, not tenant traffic — the IDE multiplexer in
//! [`crate::mux`] is the real workload this process serves.

use std::sync::Arc;

use devbox_core::{SandboxId, TerminationCause, TransactionKind};
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::connection::ConnectionManager;
use crate::effects::EffectSink;
use crate::lifecycle::{DaemonState, DriverImpl};
use crate::multiplex::CloseCode;
use crate::protocol::{
    self, AdminRequest, AdminResponse, PoolEntrySummary, ProtocolError, TransactionSummary,
    DEFAULT_TIMEOUT,
};

type Sink = EffectSink<DriverImpl, devbox_core::SystemClock, devbox_core::UuidIdGen>;

/// Shared context every admin connection handler reads from.
pub struct AdminCtx {
    pub daemon: Arc<DaemonState>,
    pub effects: Arc<Sink>,
    pub connections: Arc<ConnectionManager>,
    pub shutdown: Arc<Notify>,
}

/// Accepts connections on the admin socket, handling each on its own
/// spawned task so one slow or stuck CLI invocation never blocks the
/// next (§4.12: the admin protocol is request/response, one shot per
/// connection, never a persistent session).
pub struct AdminListener {
    socket: UnixListener,
    ctx: Arc<AdminCtx>,
}

#[derive(Debug, Error)]
enum ConnectionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl AdminListener {
    pub fn new(socket: UnixListener, ctx: Arc<AdminCtx>) -> Self {
        Self { socket, ctx }
    }

    pub async fn run(self) {
        loop {
            match self.socket.accept().await {
                Ok((stream, _)) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &ctx).await {
                            match e {
                                ConnectionError::Protocol(ProtocolError::ConnectionClosed) => {
                                    debug!("admin client disconnected without a request");
                                }
                                ConnectionError::Protocol(ProtocolError::Timeout) => {
                                    warn!("admin connection timed out waiting for a request");
                                }
                                _ => error!("admin connection error: {e}"),
                            }
                        }
                    });
                }
                Err(e) => error!("admin socket accept error: {e}"),
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, ctx: &AdminCtx) -> Result<(), ConnectionError> {
    let (mut reader, mut writer) = stream.into_split();

    let request: AdminRequest = protocol::read_typed(&mut reader, DEFAULT_TIMEOUT).await?;
    if matches!(request, AdminRequest::Ping) {
        debug!(?request, "received admin request");
    } else {
        info!(?request, "received admin request");
    }

    let response = handle_request(request, ctx).await;

    protocol::write_typed(&mut writer, &response, DEFAULT_TIMEOUT).await?;
    Ok(())
}

async fn handle_request(request: AdminRequest, ctx: &AdminCtx) -> AdminResponse {
    match request {
        AdminRequest::Ping => AdminResponse::Pong,

        AdminRequest::Hello { version: _ } => AdminResponse::Hello {
            version: protocol::PROTOCOL_VERSION.to_string(),
        },

        AdminRequest::Status => {
            let state = ctx.daemon.state.lock();
            AdminResponse::Status {
                uptime_secs: ctx.daemon.uptime_secs(),
                sandboxes_active: state
                    .sandboxes
                    .values()
                    .filter(|s| s.state != devbox_core::SandboxState::Gone)
                    .count(),
                sessions_active: state.sessions.values().filter(|s| s.terminated_at_ms.is_none()).count(),
                connections_active: state.connections.len(),
            }
        }

        AdminRequest::LedgerShow { account } => ledger_show(ctx, &account),

        AdminRequest::PoolStatus => {
            let entries = ctx
                .daemon
                .orchestrator
                .pool_status()
                .into_iter()
                .map(|(runtime, idle_count, assigned_count)| PoolEntrySummary {
                    runtime: runtime.to_string(),
                    idle_count: idle_count as usize,
                    assigned_count: assigned_count as usize,
                })
                .collect();
            AdminResponse::Pool { entries }
        }

        AdminRequest::Reap { sandbox, cause } => reap(ctx, &sandbox, &cause).await,

        AdminRequest::Shutdown { kill } => {
            if kill {
                for connection in ctx.connections.connection_ids() {
                    ctx.connections
                        .close_connection(&connection, CloseCode::Stale.code(), "daemon shutting down")
                        .await;
                }
            }
            ctx.shutdown.notify_one();
            AdminResponse::ShuttingDown
        }
    }
}

fn transaction_kind_str(kind: TransactionKind) -> &'static str {
    use TransactionKind::*;
    match kind {
        Grant => "grant",
        Usage => "usage",
        Earning => "earning",
        GiftOut => "gift_out",
        GiftIn => "gift_in",
        Rollover => "rollover",
    }
}

fn ledger_show(ctx: &AdminCtx, account: &str) -> AdminResponse {
    let state = ctx.daemon.state.lock();
    let Some(balance) = state.accounts.get(account) else {
        return AdminResponse::Error { message: format!("unknown account {account}") };
    };

    let mut recent: Vec<TransactionSummary> = state
        .transactions
        .values()
        .filter(|tx| tx.account_ref.as_str() == account)
        .map(|tx| TransactionSummary {
            id: tx.id.to_string(),
            amount: tx.amount.to_string(),
            kind: transaction_kind_str(tx.kind).to_string(),
            reference: tx.reference.clone(),
            recorded_at_ms: tx.recorded_at_ms,
        })
        .collect();
    recent.sort_by(|a, b| b.recorded_at_ms.cmp(&a.recorded_at_ms));
    recent.truncate(10);

    AdminResponse::Ledger {
        account: account.to_string(),
        balance: balance.balance.to_string(),
        lifetime_earned: balance.lifetime_earned.to_string(),
        lifetime_spent: balance.lifetime_spent.to_string(),
        recent_transactions: recent,
    }
}

/// Parse a cause string in the same `snake_case` vocabulary the wire
/// protocol serializes `TerminationCause` as, defaulting to
/// `AdminForced` for anything else — an operator typo should still reap,
/// just with an honestly-attributed cause.
fn parse_cause(cause: &str) -> TerminationCause {
    use TerminationCause::*;
    match cause {
        "user_requested" => UserRequested,
        "idle" => Idle,
        "credits_exhausted" => CreditsExhausted,
        "health_check_failed" => HealthCheckFailed,
        "daemon_shutdown" => DaemonShutdown,
        _ => AdminForced,
    }
}

async fn reap(ctx: &AdminCtx, sandbox: &str, cause: &str) -> AdminResponse {
    let Ok(sandbox_record) = ctx.daemon.orchestrator.sandbox(&SandboxId::new(sandbox)) else {
        return AdminResponse::Error { message: format!("unknown sandbox {sandbox}") };
    };

    let Some(session_id) = sandbox_record.labels.session.clone() else {
        return match ctx.daemon.orchestrator.destroy_sandbox(&sandbox_record.id).await {
            Ok(effects) => match ctx.effects.apply(effects).await {
                Ok(()) => AdminResponse::Ok,
                Err(e) => AdminResponse::Error { message: e.to_string() },
            },
            Err(e) => AdminResponse::Error { message: e.to_string() },
        };
    };

    let Some(session) = ctx.daemon.orchestrator.session(&session_id) else {
        return AdminResponse::Error { message: format!("sandbox {sandbox} has no live session") };
    };
    let final_cost = ctx.daemon.usage_meter.take_pending_cost(&session_id).unwrap_or(Decimal::ZERO);

    match ctx
        .daemon
        .orchestrator
        .reap(&session_id, parse_cause(cause), final_cost, session.user_ref.clone())
        .await
    {
        Ok(effects) => match ctx.effects.apply(effects).await {
            Ok(()) => AdminResponse::Ok,
            Err(e) => AdminResponse::Error { message: e.to_string() },
        },
        Err(e) => AdminResponse::Error { message: e.to_string() },
    }
}

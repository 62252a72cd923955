// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for handling socket I/O.
//!
//! Accepts Unix-socket connections without blocking the orchestrator.
//! Each connection runs a read loop plus one serialized writer task;
//! every request is dispatched on its own task so a slow handler never
//! stalls the connection. Streaming requests hold their request id and
//! emit notifications until the client disconnects.

mod handlers;
mod streams;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clier_wire::{ErrorKind, FramingError, Notification, Request, Response};
use tokio::io::AsyncRead;
use tokio::net::{unix::OwnedWriteHalf, UnixListener, UnixStream};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::env::ipc_timeout;
use crate::event_bus::EventBus;
use crate::logs::LogStore;
use crate::orchestrator::DaemonOrchestrator;

/// Shared daemon context for all request handlers.
pub struct ListenCtx {
    pub orchestrator: Arc<DaemonOrchestrator>,
    pub logs: Arc<LogStore>,
    pub bus: EventBus,
    pub start_time: Instant,
    pub shutdown: Arc<Notify>,
    /// Directory holding the daemon's own log files (for `daemon.logs.clear`).
    pub daemon_logs_dir: PathBuf,
}

/// Listener task for accepting socket connections.
pub struct Listener {
    unix: UnixListener,
    ctx: Arc<ListenCtx>,
}

/// One outbound frame; the writer task serializes them onto the socket.
pub(crate) enum Outbound {
    Response(Response),
    Notification(Notification),
}

impl Listener {
    pub fn new(unix: UnixListener, ctx: Arc<ListenCtx>) -> Self {
        Self { unix, ctx }
    }

    /// Run the accept loop until the daemon shuts down, spawning a task
    /// per connection.
    pub async fn run(self) {
        loop {
            match self.unix.accept().await {
                Ok((stream, _)) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        handle_connection(stream, ctx).await;
                    });
                }
                Err(e) => error!("accept error: {}", e),
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, ctx: Arc<ListenCtx>) {
    let (reader, writer) = stream.into_split();
    let (out_tx, out_rx) = mpsc::channel::<Outbound>(64);

    let writer_task = tokio::spawn(write_loop(writer, out_rx));

    // Cancelling on disconnect stops streaming tasks and abandoned handlers
    let cancel = CancellationToken::new();
    read_loop(reader, &out_tx, &ctx, &cancel).await;
    cancel.cancel();
    drop(out_tx);

    let _ = writer_task.await;
    debug!("connection closed");
}

async fn read_loop<R>(
    mut reader: R,
    out_tx: &mpsc::Sender<Outbound>,
    ctx: &Arc<ListenCtx>,
    cancel: &CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let payload = match clier_wire::read_message(&mut reader).await {
            Ok(payload) => payload,
            Err(FramingError::ConnectionClosed) => break,
            Err(e) => {
                debug!(error = %e, "dropping connection on read error");
                break;
            }
        };
        dispatch_payload(&payload, out_tx, ctx, cancel);
    }
}

/// Every method name in the dispatch table; anything else is
/// `unknown_method` rather than `invalid_params`.
const KNOWN_METHODS: &[&str] = &[
    "daemon.status",
    "daemon.shutdown",
    "daemon.logs.clear",
    "process.list",
    "process.status",
    "process.start",
    "process.stop",
    "process.restart",
    "process.input",
    "logs.tail",
    "logs.stream",
    "logs.clear",
    "events.subscribe",
];

fn dispatch_payload(
    payload: &[u8],
    out_tx: &mpsc::Sender<Outbound>,
    ctx: &Arc<ListenCtx>,
    cancel: &CancellationToken,
) {
    let value: serde_json::Value = match serde_json::from_slice(payload) {
        Ok(value) => value,
        Err(e) => {
            send_response(
                out_tx,
                Response::error(0, ErrorKind::InvalidParams, format!("invalid JSON: {e}")),
            );
            return;
        }
    };
    let id = value.get("id").and_then(serde_json::Value::as_u64).unwrap_or(0);

    let request: Request = match serde_json::from_value(value.clone()) {
        Ok(request) => request,
        Err(e) => {
            let method = value.get("method").and_then(serde_json::Value::as_str);
            let kind = match method {
                Some(name) if KNOWN_METHODS.contains(&name) => ErrorKind::InvalidParams,
                Some(_) | None => ErrorKind::UnknownMethod,
            };
            let message = match (kind, method) {
                (ErrorKind::UnknownMethod, Some(name)) => format!("unknown method: {name}"),
                (ErrorKind::UnknownMethod, None) => "missing method".to_string(),
                _ => format!("invalid params: {e}"),
            };
            send_response(out_tx, Response::error(id, kind, message));
            return;
        }
    };

    if matches!(request.method, clier_wire::Method::DaemonStatus {} | clier_wire::Method::ProcessList {}) {
        debug!(method = request.method.name(), id, "received query");
    } else {
        info!(method = request.method.name(), id, "received request");
    }

    let ctx = Arc::clone(ctx);
    let out_tx = out_tx.clone();
    let cancel = cancel.child_token();
    tokio::spawn(async move {
        handle_request(request, ctx, out_tx, cancel).await;
    });
}

async fn handle_request(
    request: Request,
    ctx: Arc<ListenCtx>,
    out_tx: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
) {
    let id = request.id;

    if request.method.is_streaming() {
        streams::handle_streaming(id, request.method, &ctx, &out_tx, &cancel).await;
        return;
    }

    // Non-streaming requests carry the default timeout and die with the
    // connection
    let response = tokio::select! {
        result = tokio::time::timeout(ipc_timeout(), handlers::dispatch(request.method, &ctx)) => {
            match result {
                Ok(Ok(result)) => Response::ok(id, result),
                Ok(Err(e)) => e.into_response(id),
                Err(_) => Response::error(id, ErrorKind::Timeout, "request timed out"),
            }
        }
        _ = cancel.cancelled() => {
            debug!(id, "client disconnected, cancelling handler");
            return;
        }
    };
    let _ = out_tx.send(Outbound::Response(response)).await;
}

fn send_response(out_tx: &mpsc::Sender<Outbound>, response: Response) {
    let out_tx = out_tx.clone();
    tokio::spawn(async move {
        let _ = out_tx.send(Outbound::Response(response)).await;
    });
}

async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<Outbound>) {
    while let Some(outbound) = rx.recv().await {
        let encoded = match &outbound {
            Outbound::Response(response) => clier_wire::encode(response),
            Outbound::Notification(note) => clier_wire::encode(note),
        };
        let payload = match encoded {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "failed to encode outbound message");
                continue;
            }
        };
        if let Err(e) = clier_wire::write_message(&mut writer, &payload).await {
            debug!(error = %e, "write failed, dropping connection");
            break;
        }
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;

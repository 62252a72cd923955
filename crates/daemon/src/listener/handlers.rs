// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Non-streaming request handlers: one per dispatch-table method.

use std::time::Duration;

use clier_wire::{DaemonStatus, ErrorKind, InputResult, LogTail, Method, Response};
use serde_json::{json, Value};
use tracing::info;

use super::ListenCtx;
use crate::supervisor::SupervisorError;

/// Handler failure, mapped onto a wire error.
pub(super) struct HandlerError {
    kind: ErrorKind,
    message: String,
    data: Option<Value>,
}

impl HandlerError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), data: None }
    }

    fn not_found(name: &str) -> Self {
        Self::new(ErrorKind::NotFound, format!("no such process: {name}"))
    }

    pub(super) fn into_response(self, id: u64) -> Response {
        match self.data {
            Some(data) => Response::error_with_data(id, self.kind, self.message, data),
            None => Response::error(id, self.kind, self.message),
        }
    }
}

impl From<SupervisorError> for HandlerError {
    fn from(e: SupervisorError) -> Self {
        match e {
            SupervisorError::CircuitOpen { retry_after_ms } => Self {
                kind: ErrorKind::CircuitOpen,
                message: "start refused: circuit open".to_string(),
                data: Some(json!({ "retryAfterMs": retry_after_ms })),
            },
            SupervisorError::Spawn(detail) => Self::new(ErrorKind::SpawnFailed, detail),
            SupervisorError::NotRunning => {
                Self::new(ErrorKind::InvalidState, "process is not running")
            }
            SupervisorError::Input(detail) => Self::new(ErrorKind::Internal, detail),
        }
    }
}

pub(super) async fn dispatch(method: Method, ctx: &ListenCtx) -> Result<Value, HandlerError> {
    match method {
        Method::DaemonStatus {} => daemon_status(ctx),
        Method::DaemonShutdown {} => daemon_shutdown(ctx),
        Method::DaemonLogsClear { level } => daemon_logs_clear(ctx, level.as_deref()).await,
        Method::ProcessList {} => Ok(json!({ "processes": ctx.orchestrator.statuses() })),
        Method::ProcessStatus { name } => process_status(ctx, &name),
        Method::ProcessStart { name } => process_start(ctx, &name).await,
        Method::ProcessStop { name, grace_ms } => process_stop(ctx, &name, grace_ms).await,
        Method::ProcessRestart { name } => process_restart(ctx, &name).await,
        Method::ProcessInput { name, data, append_newline } => {
            process_input(ctx, &name, &data, append_newline).await
        }
        Method::LogsTail { name, stream, n } => logs_tail(ctx, &name, stream, n),
        Method::LogsClear { name } => logs_clear(ctx, name.as_deref()),
        // Streaming methods never reach this dispatcher
        Method::LogsStream { .. } | Method::EventsSubscribe { .. } => Err(HandlerError::new(
            ErrorKind::Internal,
            "streaming method routed to unary dispatch",
        )),
    }
}

fn daemon_status(ctx: &ListenCtx) -> Result<Value, HandlerError> {
    let uptime = ctx.start_time.elapsed();
    let started_at = chrono::Utc::now()
        - chrono::Duration::from_std(uptime).unwrap_or_else(|_| chrono::Duration::zero());
    let status = DaemonStatus {
        project_name: ctx.orchestrator.project_name().to_string(),
        pid: std::process::id(),
        uptime_secs: uptime.as_secs(),
        started_at: started_at.to_rfc3339(),
        processes: ctx.orchestrator.statuses(),
    };
    serde_json::to_value(status)
        .map_err(|e| HandlerError::new(ErrorKind::Internal, e.to_string()))
}

fn daemon_shutdown(ctx: &ListenCtx) -> Result<Value, HandlerError> {
    info!("shutdown requested over IPC");
    // Let the response flush before the daemon starts tearing down
    let shutdown = std::sync::Arc::clone(&ctx.shutdown);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.notify_one();
    });
    Ok(json!({ "shuttingDown": true }))
}

async fn daemon_logs_clear(ctx: &ListenCtx, level: Option<&str>) -> Result<Value, HandlerError> {
    let targets: &[&str] = match level {
        Some("error") => &["error.log"],
        _ => &["combined.log", "error.log"],
    };
    for file in targets {
        let path = ctx.daemon_logs_dir.join(file);
        if path.exists() {
            tokio::fs::OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(&path)
                .await
                .map_err(|e| HandlerError::new(ErrorKind::Internal, e.to_string()))?;
        }
    }
    Ok(json!({ "cleared": true }))
}

fn process_status(ctx: &ListenCtx, name: &str) -> Result<Value, HandlerError> {
    let supervisor =
        ctx.orchestrator.supervisor(name).ok_or_else(|| HandlerError::not_found(name))?;
    serde_json::to_value(supervisor.status())
        .map_err(|e| HandlerError::new(ErrorKind::Internal, e.to_string()))
}

async fn process_start(ctx: &ListenCtx, name: &str) -> Result<Value, HandlerError> {
    let supervisor =
        ctx.orchestrator.supervisor(name).ok_or_else(|| HandlerError::not_found(name))?;
    supervisor.start(None).await?;
    serde_json::to_value(supervisor.status())
        .map_err(|e| HandlerError::new(ErrorKind::Internal, e.to_string()))
}

async fn process_stop(
    ctx: &ListenCtx,
    name: &str,
    grace_ms: Option<u64>,
) -> Result<Value, HandlerError> {
    let supervisor =
        ctx.orchestrator.supervisor(name).ok_or_else(|| HandlerError::not_found(name))?;
    supervisor.stop(grace_ms.map(Duration::from_millis)).await?;
    serde_json::to_value(supervisor.status())
        .map_err(|e| HandlerError::new(ErrorKind::Internal, e.to_string()))
}

async fn process_restart(ctx: &ListenCtx, name: &str) -> Result<Value, HandlerError> {
    let supervisor =
        ctx.orchestrator.supervisor(name).ok_or_else(|| HandlerError::not_found(name))?;
    supervisor.restart(None).await?;
    serde_json::to_value(supervisor.status())
        .map_err(|e| HandlerError::new(ErrorKind::Internal, e.to_string()))
}

async fn process_input(
    ctx: &ListenCtx,
    name: &str,
    data: &str,
    append_newline: bool,
) -> Result<Value, HandlerError> {
    let supervisor =
        ctx.orchestrator.supervisor(name).ok_or_else(|| HandlerError::not_found(name))?;
    let bytes_written = supervisor.send_input(data, append_newline).await?;
    serde_json::to_value(InputResult { bytes_written })
        .map_err(|e| HandlerError::new(ErrorKind::Internal, e.to_string()))
}

fn logs_tail(
    ctx: &ListenCtx,
    name: &str,
    stream: Option<clier_core::StreamKind>,
    n: usize,
) -> Result<Value, HandlerError> {
    let entries = ctx.logs.tail(name, stream, n).ok_or_else(|| HandlerError::not_found(name))?;
    serde_json::to_value(LogTail { entries })
        .map_err(|e| HandlerError::new(ErrorKind::Internal, e.to_string()))
}

fn logs_clear(ctx: &ListenCtx, name: Option<&str>) -> Result<Value, HandlerError> {
    if ctx.logs.clear(name) {
        Ok(json!({ "cleared": true }))
    } else {
        Err(HandlerError::not_found(name.unwrap_or("")))
    }
}

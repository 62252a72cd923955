// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Streaming request handlers: `logs.stream` and `events.subscribe`.
//!
//! Both acknowledge with a normal response, then deliver notifications
//! sharing the request id until the client disconnects (the connection's
//! cancellation token fires) or the writer goes away.

use std::collections::HashMap;

use clier_core::StreamKind;
use clier_wire::{ErrorKind, Method, Notification, Response};
use serde_json::json;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ListenCtx, Outbound};

pub(super) async fn handle_streaming(
    id: u64,
    method: Method,
    ctx: &ListenCtx,
    out_tx: &mpsc::Sender<Outbound>,
    cancel: &CancellationToken,
) {
    match method {
        Method::LogsStream { name, from_seq } => {
            stream_logs(id, &name, &from_seq, ctx, out_tx, cancel).await;
        }
        Method::EventsSubscribe { pattern } => {
            stream_events(id, &pattern, ctx, out_tx, cancel).await;
        }
        _ => {
            let _ = out_tx
                .send(Outbound::Response(Response::error(
                    id,
                    ErrorKind::Internal,
                    "non-streaming method routed to stream dispatch",
                )))
                .await;
        }
    }
}

async fn stream_logs(
    id: u64,
    name: &str,
    from_seq: &HashMap<StreamKind, u64>,
    ctx: &ListenCtx,
    out_tx: &mpsc::Sender<Outbound>,
    cancel: &CancellationToken,
) {
    // Subscribe before snapshotting so no entry falls between the two;
    // duplicates are filtered by sequence number below.
    let mut live = ctx.logs.subscribe();
    let Some(backlog) = ctx.logs.snapshot_from(name, from_seq) else {
        let _ = out_tx
            .send(Outbound::Response(Response::error(
                id,
                ErrorKind::NotFound,
                format!("no such process: {name}"),
            )))
            .await;
        return;
    };

    if out_tx
        .send(Outbound::Response(Response::ok(id, json!({ "streaming": true }))))
        .await
        .is_err()
    {
        return;
    }

    let mut delivered: HashMap<StreamKind, u64> = HashMap::new();
    for entry in backlog {
        delivered.insert(entry.stream, entry.seq);
        if send_entry(id, out_tx, &entry).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(id, "log stream cancelled");
                return;
            }
            received = live.recv() => match received {
                Ok(entry) => {
                    if entry.process_name != name {
                        continue;
                    }
                    // Each stream is gated by its own watermark
                    if entry.seq < from_seq.get(&entry.stream).copied().unwrap_or(0) {
                        continue;
                    }
                    if delivered.get(&entry.stream).is_some_and(|&last| entry.seq <= last) {
                        continue;
                    }
                    delivered.insert(entry.stream, entry.seq);
                    if send_entry(id, out_tx, &entry).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(id, skipped, "log stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }
}

async fn send_entry(
    id: u64,
    out_tx: &mpsc::Sender<Outbound>,
    entry: &clier_core::LogEntry,
) -> Result<(), ()> {
    let data = serde_json::to_value(entry).map_err(|_| ())?;
    out_tx
        .send(Outbound::Notification(Notification {
            id,
            event: "log.entry".to_string(),
            data,
        }))
        .await
        .map_err(|_| ())
}

async fn stream_events(
    id: u64,
    pattern: &str,
    ctx: &ListenCtx,
    out_tx: &mpsc::Sender<Outbound>,
    cancel: &CancellationToken,
) {
    let mut rx = ctx.bus.subscribe(pattern);

    if out_tx
        .send(Outbound::Response(Response::ok(id, json!({ "streaming": true }))))
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(id, "event stream cancelled");
                return;
            }
            received = rx.recv() => match received {
                Some(event) => {
                    let Ok(data) = serde_json::to_value(&event) else { continue };
                    let note = Notification { id, event: "event".to_string(), data };
                    if out_tx.send(Outbound::Notification(note)).await.is_err() {
                        return;
                    }
                }
                None => return,
            }
        }
    }
}

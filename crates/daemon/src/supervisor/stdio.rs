// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child stdio fan-out.
//!
//! Two line-reader tasks feed a bounded queue consumed by one dispatcher
//! task per child. The dispatcher appends to the log store, runs the
//! ready/event pattern matchers, and publishes line events on the bus.
//! The bounded queue provides backpressure on noisy children.

use std::sync::Arc;

use clier_core::{ClierEvent, Clock, StreamKind};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::sync::mpsc;

use super::Shared;

const LINE_QUEUE_DEPTH: usize = 256;

pub(super) fn spawn_io<C: Clock>(
    shared: Arc<Shared<C>>,
    epoch: u64,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
) {
    let (tx, rx) = mpsc::channel::<(StreamKind, String)>(LINE_QUEUE_DEPTH);

    if let Some(stdout) = stdout {
        tokio::spawn(read_lines(stdout, StreamKind::Stdout, tx.clone()));
    }
    if let Some(stderr) = stderr {
        tokio::spawn(read_lines(stderr, StreamKind::Stderr, tx.clone()));
    }
    drop(tx);

    tokio::spawn(dispatch(shared, epoch, rx));
}

/// Split a pipe into lines, stripping the trailing CR of CRLF endings.
async fn read_lines<R>(pipe: R, stream: StreamKind, tx: mpsc::Sender<(StreamKind, String)>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(pipe).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(mut line)) => {
                if line.ends_with('\r') {
                    line.pop();
                }
                if tx.send((stream, line)).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(?stream, error = %e, "stdio read error");
                break;
            }
        }
    }
}

/// Ends when both readers close (child exit) or the incarnation is
/// superseded.
async fn dispatch<C: Clock>(
    shared: Arc<Shared<C>>,
    epoch: u64,
    mut rx: mpsc::Receiver<(StreamKind, String)>,
) {
    while let Some((stream, line)) = rx.recv().await {
        shared.handle_line(epoch, stream, &line);
    }
}

impl<C: Clock> Shared<C> {
    fn handle_line(self: &Arc<Self>, epoch: u64, stream: StreamKind, line: &str) {
        {
            let proc = self.proc.lock();
            if proc.epoch != epoch {
                return;
            }
        }
        let epoch_ms = self.clock.epoch_ms();
        let name = &self.spec.name;

        self.logs.append(name, stream, line, epoch_ms);

        if !self.ready_patterns.is_empty() && self.ready_patterns.matches(line) {
            self.transition_ready(epoch);
        }

        for matched in self.event_patterns.match_line(line) {
            let pattern = &self.spec.event_patterns[matched.pattern_id];
            let mut data = serde_json::Map::new();
            for (group, value) in matched.captures {
                let key = pattern.capture_map.get(&group).cloned().unwrap_or(group);
                data.insert(key, serde_json::Value::String(value));
            }
            self.bus.publish(&ClierEvent::custom(
                name,
                &pattern.emit_event,
                serde_json::Value::Object(data),
                epoch_ms,
            ));
        }

        self.bus.publish(&ClierEvent::output(
            name,
            stream == StreamKind::Stderr,
            line,
            epoch_ms,
        ));
    }
}

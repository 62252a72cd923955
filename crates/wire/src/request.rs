// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request envelope: `{"id": <int>, "method": <string>, "params": <object>}`.

use std::collections::HashMap;

use clier_core::StreamKind;
use serde::{Deserialize, Serialize};

/// A client request. `id` is chosen by the client and echoed in the
/// response and in any notifications the request produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    #[serde(flatten)]
    pub method: Method,
}

/// The dispatch table: one variant per method, params as variant fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum Method {
    #[serde(rename = "daemon.status")]
    DaemonStatus {},

    #[serde(rename = "daemon.shutdown")]
    DaemonShutdown {},

    /// Clear daemon-level log files. `level: "error"` clears only error.log.
    #[serde(rename = "daemon.logs.clear")]
    DaemonLogsClear {
        #[serde(default)]
        level: Option<String>,
    },

    #[serde(rename = "process.list")]
    ProcessList {},

    #[serde(rename = "process.status")]
    ProcessStatus { name: String },

    #[serde(rename = "process.start")]
    ProcessStart { name: String },

    #[serde(rename = "process.stop")]
    #[serde(rename_all = "camelCase")]
    ProcessStop {
        name: String,
        #[serde(default)]
        grace_ms: Option<u64>,
    },

    #[serde(rename = "process.restart")]
    ProcessRestart { name: String },

    #[serde(rename = "process.input")]
    #[serde(rename_all = "camelCase")]
    ProcessInput {
        name: String,
        data: String,
        #[serde(default)]
        append_newline: bool,
    },

    #[serde(rename = "logs.tail")]
    LogsTail {
        name: String,
        #[serde(default)]
        stream: Option<StreamKind>,
        #[serde(default = "default_tail")]
        n: usize,
    },

    /// Streaming: notifications with the request id carry log entries
    /// until the client disconnects.
    #[serde(rename = "logs.stream")]
    #[serde(rename_all = "camelCase")]
    LogsStream {
        name: String,
        /// Per-stream resume watermarks: entries with `seq` below a
        /// stream's watermark are skipped. Sequence numbers are
        /// independent per stream, so one scalar cannot address both
        /// rings. Streams absent from the map replay from the start.
        #[serde(default)]
        from_seq: HashMap<StreamKind, u64>,
    },

    /// Clear one process's logs, or all when `name` is omitted.
    #[serde(rename = "logs.clear")]
    LogsClear {
        #[serde(default)]
        name: Option<String>,
    },

    /// Streaming: notifications carry every bus event whose name matches
    /// `pattern` (literal, or glob with `*`).
    #[serde(rename = "events.subscribe")]
    EventsSubscribe { pattern: String },
}

fn default_tail() -> usize {
    100
}

impl Method {
    /// Streaming methods are exempt from the request timeout and produce
    /// notifications instead of a single result.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Method::LogsStream { .. } | Method::EventsSubscribe { .. })
    }

    /// Method name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Method::DaemonStatus {} => "daemon.status",
            Method::DaemonShutdown {} => "daemon.shutdown",
            Method::DaemonLogsClear { .. } => "daemon.logs.clear",
            Method::ProcessList {} => "process.list",
            Method::ProcessStatus { .. } => "process.status",
            Method::ProcessStart { .. } => "process.start",
            Method::ProcessStop { .. } => "process.stop",
            Method::ProcessRestart { .. } => "process.restart",
            Method::ProcessInput { .. } => "process.input",
            Method::LogsTail { .. } => "logs.tail",
            Method::LogsStream { .. } => "logs.stream",
            Method::LogsClear { .. } => "logs.clear",
            Method::EventsSubscribe { .. } => "events.subscribe",
        }
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;

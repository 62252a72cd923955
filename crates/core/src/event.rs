// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event types published on the daemon's event bus.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Classification of a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Success,
    Error,
    Crashed,
    Custom,
    Stdout,
    Stderr,
}

/// Kind of a filesystem change reported by the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeKind {
    Created,
    Modified,
    Deleted,
}

/// A named notification carried on the event bus.
///
/// `name` is the routing key (`<process>:<event>` for process-scoped
/// events, `file.changed` for watcher events). `epoch_ms` is wall-clock
/// for user display; ordering comes from bus delivery, not timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClierEvent {
    pub name: String,
    pub process_name: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub epoch_ms: u64,
}

impl ClierEvent {
    /// `<process>:started` — emitted once the child has spawned.
    pub fn started(process: &str, pid: u32, epoch_ms: u64) -> Self {
        Self {
            name: format!("{process}:started"),
            process_name: process.to_string(),
            event_type: EventType::Success,
            data: Some(serde_json::json!({ "pid": pid })),
            epoch_ms,
        }
    }

    /// `<process>:ready` — a ready pattern matched (or the process had none).
    pub fn ready(process: &str, epoch_ms: u64) -> Self {
        Self {
            name: format!("{process}:ready"),
            process_name: process.to_string(),
            event_type: EventType::Success,
            data: None,
            epoch_ms,
        }
    }

    /// `<process>:exit` — the child exited. Success for code 0, error otherwise.
    pub fn exit(process: &str, code: Option<i32>, epoch_ms: u64) -> Self {
        let event_type = if code == Some(0) { EventType::Success } else { EventType::Error };
        Self {
            name: format!("{process}:exit"),
            process_name: process.to_string(),
            event_type,
            data: Some(serde_json::json!({ "code": code })),
            epoch_ms,
        }
    }

    /// `<process>:crashed` — exited abnormally with no restart remaining.
    pub fn crashed(process: &str, code: Option<i32>, epoch_ms: u64) -> Self {
        Self {
            name: format!("{process}:crashed"),
            process_name: process.to_string(),
            event_type: EventType::Crashed,
            data: Some(serde_json::json!({ "code": code })),
            epoch_ms,
        }
    }

    /// A custom event from a matched output pattern, carrying its captures.
    pub fn custom(process: &str, event: &str, data: Value, epoch_ms: u64) -> Self {
        Self {
            name: format!("{process}:{event}"),
            process_name: process.to_string(),
            event_type: EventType::Custom,
            data: Some(data),
            epoch_ms,
        }
    }

    /// An output line event (`<process>:stdout` / `<process>:stderr`).
    pub fn output(process: &str, stderr: bool, line: &str, epoch_ms: u64) -> Self {
        let (suffix, event_type) =
            if stderr { ("stderr", EventType::Stderr) } else { ("stdout", EventType::Stdout) };
        Self {
            name: format!("{process}:{suffix}"),
            process_name: process.to_string(),
            event_type,
            data: Some(serde_json::json!({ "line": line })),
            epoch_ms,
        }
    }

    /// `file.changed` — a debounced filesystem change from a watch spec.
    pub fn file_changed(
        watch_id: &str,
        path: &std::path::Path,
        kind: FileChangeKind,
        epoch_ms: u64,
    ) -> Self {
        Self {
            name: "file.changed".to_string(),
            process_name: watch_id.to_string(),
            event_type: EventType::Custom,
            data: Some(serde_json::json!({ "path": path, "kind": kind })),
            epoch_ms,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;

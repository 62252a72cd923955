// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed result payloads for the non-streaming methods.

use clier_core::{LogEntry, ProcessState, ProcessType};
use serde::{Deserialize, Serialize};

/// One row of `process.list` / the body of `process.status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStatusEntry {
    pub name: String,
    pub state: ProcessState,
    pub process_type: ProcessType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub restart_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaker_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_ms: Option<u64>,
}

/// Body of `daemon.status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonStatus {
    pub project_name: String,
    pub pid: u32,
    pub uptime_secs: u64,
    /// Wall-clock daemon start time, RFC 3339, for display.
    pub started_at: String,
    pub processes: Vec<ProcessStatusEntry>,
}

/// Body of `logs.tail`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogTail {
    pub entries: Vec<LogEntry>,
}

/// Body of `process.input`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputResult {
    pub bytes_written: usize,
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

/// `CLIER_DAEMON_MODE=1` selects daemon mode over legacy direct mode.
/// Unset counts as daemon mode; `clierd` has no direct-mode path, so
/// startup refuses to proceed when the variable demands direct mode.
pub fn daemon_mode() -> bool {
    std::env::var("CLIER_DAEMON_MODE").map(|v| v == "1").unwrap_or(true)
}

/// Path to the pipeline config file.
pub fn config_path() -> Option<PathBuf> {
    std::env::var("CLIER_CONFIG_PATH").ok().map(PathBuf::from)
}

/// Override of the computed project root.
pub fn project_root() -> Option<PathBuf> {
    std::env::var("CLIER_PROJECT_ROOT").ok().map(PathBuf::from)
}

/// `CLIER_START_PAUSED=1` leaves all services in `pending` at startup.
pub fn start_paused() -> bool {
    std::env::var("CLIER_START_PAUSED").map(|v| v == "1").unwrap_or(false)
}

/// Log filter for the daemon's tracing subscriber.
pub fn log_filter() -> String {
    std::env::var("CLIER_LOG").unwrap_or_else(|_| "info".to_string())
}

/// Default IPC request timeout (streaming methods are exempt).
pub fn ipc_timeout() -> Duration {
    std::env::var("CLIER_IPC_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(30))
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;

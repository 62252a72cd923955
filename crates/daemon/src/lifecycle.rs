// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, shutdown, cleanup.
//!
//! Startup order matters: the PID-file lock is taken first (second
//! daemons in the same project fail fast), the socket is bound last,
//! and any failure in between cleans up what was created.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clier_core::pipeline::PipelineConfig;
use clier_core::SystemClock;
use fs2::FileExt;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::sync::{mpsc, Notify};
use tracing::{info, warn};

use crate::event_bus::EventBus;
use crate::listener::{ListenCtx, Listener};
use crate::logs::{LogStore, LogWriter};
use crate::orchestrator::{DaemonOrchestrator, Orchestrator, OrchestratorError};
use crate::watcher::{FileWatcher, WatcherError};

/// Daemon paths, all project-rooted under `.clier/`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Project root the pipeline is scoped to
    pub project_root: PathBuf,
    /// State directory (`<root>/.clier`)
    pub state_dir: PathBuf,
    /// Unix socket path
    pub socket_path: PathBuf,
    /// PID file (pid + socket path; also the exclusive lock)
    pub pid_path: PathBuf,
    /// Per-process log files
    pub logs_path: PathBuf,
    /// Daemon-level log files (`combined.log`, `error.log`)
    pub daemon_logs_path: PathBuf,
}

impl Config {
    /// Resolve paths for a project root.
    pub fn for_root(project_root: PathBuf) -> Self {
        let state_dir = project_root.join(".clier");
        Self {
            socket_path: state_dir.join("daemon.sock"),
            pid_path: state_dir.join("daemon.pid"),
            logs_path: state_dir.join("logs"),
            daemon_logs_path: state_dir.join("logs").join("daemon"),
            state_dir,
            project_root,
        }
    }

    /// Resolve from the environment: `CLIER_PROJECT_ROOT` overrides the
    /// current directory.
    pub fn load() -> Result<Self, LifecycleError> {
        let root = match crate::env::project_root() {
            Some(root) => root,
            None => std::env::current_dir().map_err(LifecycleError::Io)?,
        };
        Ok(Self::for_root(root))
    }
}

/// Running daemon: owns the components and the PID-file lock.
pub struct DaemonState {
    pub config: Config,
    // NOTE(lifetime): held to maintain the exclusive PID-file lock;
    // released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub orchestrator: Arc<DaemonOrchestrator>,
    pub bus: EventBus,
    pub logs: Arc<LogStore>,
    pub shutdown: Arc<Notify>,
    pub start_time: Instant,
    watcher: Option<FileWatcher>,
}

/// Startup output: the daemon state plus the listener to spawn.
pub struct StartupResult {
    pub daemon: DaemonState,
    pub listener: Listener,
}

/// Start the daemon for a validated pipeline.
pub async fn startup(
    config: &Config,
    pipeline: PipelineConfig,
    paused: bool,
) -> Result<StartupResult, LifecycleError> {
    match startup_inner(config, pipeline, paused).await {
        Ok(result) => Ok(result),
        Err(e) => {
            // A lock failure means another daemon owns these files
            if !matches!(e, LifecycleError::LockFailed(_)) {
                cleanup_files(config);
            }
            Err(e)
        }
    }
}

async fn startup_inner(
    config: &Config,
    pipeline: PipelineConfig,
    paused: bool,
) -> Result<StartupResult, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;
    std::fs::create_dir_all(&config.logs_path)?;
    std::fs::create_dir_all(&config.daemon_logs_path)?;

    // Lock first; avoid truncating a running daemon's PID file before the
    // lock is held
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.pid_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;

    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    writeln!(lock_file, "{}", config.socket_path.display())?;
    let lock_file = lock_file;

    // Assemble components
    let bus = EventBus::new();
    let (file_tx, file_rx) = mpsc::unbounded_channel();
    let _writer_task = LogWriter::spawn(config.logs_path.clone(), file_rx);
    let logs = Arc::new(LogStore::with_writer(pipeline.log_capacity, file_tx));

    let watcher =
        FileWatcher::spawn(&config.project_root, &pipeline.watches, bus.clone(), SystemClock)?;

    let orchestrator =
        Orchestrator::new(pipeline, SystemClock, bus.clone(), Arc::clone(&logs), paused)?;

    // Bind last, removing any stale socket from a crashed daemon
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let unix = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    let shutdown = Arc::new(Notify::new());
    let start_time = Instant::now();
    let ctx = Arc::new(ListenCtx {
        orchestrator: Arc::clone(&orchestrator),
        logs: Arc::clone(&logs),
        bus: bus.clone(),
        start_time,
        shutdown: Arc::clone(&shutdown),
        daemon_logs_dir: config.daemon_logs_path.clone(),
    });
    let listener = Listener::new(unix, ctx);

    let _event_loop = orchestrator.run();
    info!(project_root = %config.project_root.display(), "daemon started");

    Ok(StartupResult {
        daemon: DaemonState {
            config: config.clone(),
            lock_file,
            orchestrator,
            bus,
            logs,
            shutdown,
            start_time,
            watcher,
        },
        listener,
    })
}

impl DaemonState {
    /// Graceful shutdown: stop the pipeline in reverse order, then
    /// release the socket and PID file.
    pub async fn shutdown(&mut self) {
        info!("shutting down daemon...");
        if let Some(watcher) = &self.watcher {
            watcher.shutdown();
        }
        self.orchestrator.shutdown().await;

        if self.config.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
                warn!("failed to remove socket file: {}", e);
            }
        }
        if self.config.pid_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.pid_path) {
                warn!("failed to remove PID file: {}", e);
            }
        }
        // Lock released when lock_file drops
        info!("daemon shutdown complete");
    }
}

fn cleanup_files(config: &Config) {
    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }
    if config.pid_path.exists() {
        let _ = std::fs::remove_file(&config.pid_path);
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    Watcher(#[from] WatcherError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;

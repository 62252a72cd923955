// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `clierd` - the Clier daemon binary.
//!
//! Loads the validated pipeline named by `CLIER_CONFIG_PATH`, starts the
//! supervision kernel, and serves IPC until shutdown (request or signal).

use std::process::ExitCode;

use clier_core::pipeline::{PipelineConfig, PipelineError};
use clier_daemon::lifecycle::{startup, Config, LifecycleError, StartupResult};
use thiserror::Error;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Debug, Error)]
enum MainError {
    #[error("CLIER_DAEMON_MODE requests legacy direct mode; clierd only runs as a daemon")]
    DirectMode,

    #[error("CLIER_CONFIG_PATH is not set")]
    NoConfigPath,

    #[error("failed to read pipeline config {path}: {source}")]
    ReadConfig {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("clierd: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), MainError> {
    if !clier_daemon::env::daemon_mode() {
        return Err(MainError::DirectMode);
    }
    let config = Config::load()?;
    std::fs::create_dir_all(&config.daemon_logs_path)?;
    let _log_guards = init_tracing(&config);

    let pipeline_path = clier_daemon::env::config_path().ok_or(MainError::NoConfigPath)?;
    let json = std::fs::read_to_string(&pipeline_path).map_err(|source| {
        MainError::ReadConfig { path: pipeline_path.display().to_string(), source }
    })?;
    let pipeline = PipelineConfig::from_json(&json)?;

    let paused = clier_daemon::env::start_paused();
    let StartupResult { mut daemon, listener } = startup(&config, pipeline, paused).await?;
    tokio::spawn(listener.run());

    // The CLI waits for this line before connecting
    println!("READY");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let shutdown = daemon.shutdown.clone();
    tokio::select! {
        _ = shutdown.notified() => info!("shutdown requested"),
        _ = sigterm.recv() => info!("SIGTERM received"),
        _ = sigint.recv() => info!("SIGINT received"),
    }

    daemon.shutdown().await;
    Ok(())
}

/// Two appenders: everything to combined.log, WARN and up to error.log.
/// The guards must outlive the daemon or buffered lines are lost.
fn init_tracing(
    config: &Config,
) -> (tracing_appender::non_blocking::WorkerGuard, tracing_appender::non_blocking::WorkerGuard) {
    let combined = tracing_appender::rolling::never(&config.daemon_logs_path, "combined.log");
    let (combined_writer, combined_guard) = tracing_appender::non_blocking(combined);

    let errors = tracing_appender::rolling::never(&config.daemon_logs_path, "error.log");
    let (error_writer, error_guard) = tracing_appender::non_blocking(errors);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(combined_writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new(clier_daemon::env::log_filter())),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(error_writer)
                .with_ansi(false)
                .with_filter(LevelFilter::WARN),
        )
        .init();

    (combined_guard, error_guard)
}

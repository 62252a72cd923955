// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background task mirroring log entries to per-process files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clier_core::StreamKind;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use super::LogWrite;

/// Append-only mirror of the log store under
/// `<logs>/<process>/{stdout,stderr}.log`. Write failures are logged and
/// skipped; the in-memory store stays authoritative.
pub struct LogWriter;

impl LogWriter {
    /// Spawn the writer task. It runs until the sending side closes.
    pub fn spawn(logs_dir: PathBuf, mut rx: mpsc::UnboundedReceiver<LogWrite>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut files: HashMap<(String, StreamKind), File> = HashMap::new();
            while let Some(write) = rx.recv().await {
                match write {
                    LogWrite::Entry(entry) => {
                        let key = (entry.process_name.clone(), entry.stream);
                        if !files.contains_key(&key) {
                            match open_append(&logs_dir, &entry.process_name, entry.stream).await {
                                Ok(file) => {
                                    files.insert(key.clone(), file);
                                }
                                Err(e) => {
                                    warn!(process = %entry.process_name, error = %e, "failed to open log file");
                                    continue;
                                }
                            }
                        }
                        if let Some(file) = files.get_mut(&key) {
                            let line = format!("{}\n", entry.line);
                            if let Err(e) = file.write_all(line.as_bytes()).await {
                                warn!(process = %entry.process_name, error = %e, "failed to append log line");
                                files.remove(&key);
                            }
                        }
                    }
                    LogWrite::Clear { process } => {
                        match process {
                            Some(name) => {
                                files.retain(|(p, _), _| p != &name);
                                truncate_process(&logs_dir, &name).await;
                            }
                            None => {
                                let names: Vec<String> =
                                    files.keys().map(|(p, _)| p.clone()).collect();
                                files.clear();
                                for name in dedup(names) {
                                    truncate_process(&logs_dir, &name).await;
                                }
                                truncate_all_dirs(&logs_dir).await;
                            }
                        }
                    }
                }
            }
        })
    }
}

fn dedup(mut names: Vec<String>) -> Vec<String> {
    names.sort();
    names.dedup();
    names
}

async fn open_append(logs_dir: &Path, process: &str, stream: StreamKind) -> std::io::Result<File> {
    let dir = logs_dir.join(process);
    tokio::fs::create_dir_all(&dir).await?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(format!("{}.log", stream.as_str())))
        .await
}

async fn truncate_process(logs_dir: &Path, process: &str) {
    for stream in [StreamKind::Stdout, StreamKind::Stderr] {
        let path = logs_dir.join(process).join(format!("{}.log", stream.as_str()));
        if path.exists() {
            if let Err(e) = OpenOptions::new().write(true).truncate(true).open(&path).await {
                warn!(path = %path.display(), error = %e, "failed to truncate log file");
            }
        }
    }
}

/// Clear-all also covers processes whose files exist from a previous run
/// but have no open handle yet.
async fn truncate_all_dirs(logs_dir: &Path) {
    let Ok(mut dir) = tokio::fs::read_dir(logs_dir).await else {
        return;
    };
    while let Ok(Some(entry)) = dir.next_entry().await {
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            if let Some(name) = entry.file_name().to_str() {
                if name != "daemon" {
                    truncate_process(logs_dir, name).await;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "writer_tests.rs"]
mod tests;

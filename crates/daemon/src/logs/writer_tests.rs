// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use clier_core::LogEntry;

fn entry(process: &str, stream: StreamKind, line: &str) -> LogWrite {
    LogWrite::Entry(LogEntry {
        process_name: process.to_string(),
        stream,
        line: line.to_string(),
        seq: 0,
        epoch_ms: 0,
    })
}

#[tokio::test]
async fn mirrors_entries_to_per_process_files() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = LogWriter::spawn(dir.path().to_path_buf(), rx);

    tx.send(entry("web", StreamKind::Stdout, "hello")).unwrap();
    tx.send(entry("web", StreamKind::Stdout, "world")).unwrap();
    tx.send(entry("web", StreamKind::Stderr, "oops")).unwrap();
    drop(tx);
    handle.await.unwrap();

    let stdout = std::fs::read_to_string(dir.path().join("web/stdout.log")).unwrap();
    assert_eq!(stdout, "hello\nworld\n");
    let stderr = std::fs::read_to_string(dir.path().join("web/stderr.log")).unwrap();
    assert_eq!(stderr, "oops\n");
}

#[tokio::test]
async fn clear_truncates_named_process_only() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = LogWriter::spawn(dir.path().to_path_buf(), rx);

    tx.send(entry("web", StreamKind::Stdout, "web line")).unwrap();
    tx.send(entry("api", StreamKind::Stdout, "api line")).unwrap();
    tx.send(LogWrite::Clear { process: Some("web".to_string()) }).unwrap();
    drop(tx);
    handle.await.unwrap();

    let web = std::fs::read_to_string(dir.path().join("web/stdout.log")).unwrap();
    assert_eq!(web, "");
    let api = std::fs::read_to_string(dir.path().join("api/stdout.log")).unwrap();
    assert_eq!(api, "api line\n");
}

#[tokio::test]
async fn appends_resume_after_clear() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = LogWriter::spawn(dir.path().to_path_buf(), rx);

    tx.send(entry("web", StreamKind::Stdout, "before")).unwrap();
    tx.send(LogWrite::Clear { process: Some("web".to_string()) }).unwrap();
    tx.send(entry("web", StreamKind::Stdout, "after")).unwrap();
    drop(tx);
    handle.await.unwrap();

    let stdout = std::fs::read_to_string(dir.path().join("web/stdout.log")).unwrap();
    assert_eq!(stdout, "after\n");
}

#[tokio::test]
async fn clear_all_spares_daemon_logs() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("daemon")).unwrap();
    std::fs::write(dir.path().join("daemon/stdout.log"), "keep me\n").unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    let handle = LogWriter::spawn(dir.path().to_path_buf(), rx);
    tx.send(entry("web", StreamKind::Stdout, "gone")).unwrap();
    tx.send(LogWrite::Clear { process: None }).unwrap();
    drop(tx);
    handle.await.unwrap();

    let web = std::fs::read_to_string(dir.path().join("web/stdout.log")).unwrap();
    assert_eq!(web, "");
    let daemon = std::fs::read_to_string(dir.path().join("daemon/stdout.log")).unwrap();
    assert_eq!(daemon, "keep me\n");
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-process output capture.
//!
//! The store keeps a bounded ring per (process, stream) with sequence
//! numbers that are strictly increasing and survive clears, so a client
//! streaming from a sequence number never sees duplicates. A background
//! writer task mirrors every entry append-only to
//! `<logs>/<process>/{stdout,stderr}.log`.

mod writer;

pub use writer::LogWriter;

use std::collections::{HashMap, VecDeque};

use clier_core::{LogEntry, StreamKind};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

/// A store mutation forwarded to the file writer.
#[derive(Debug, Clone)]
pub enum LogWrite {
    Entry(LogEntry),
    Clear { process: Option<String> },
}

#[derive(Default)]
struct StreamRing {
    entries: VecDeque<LogEntry>,
    next_seq: u64,
}

#[derive(Default)]
struct ProcessLogs {
    stdout: StreamRing,
    stderr: StreamRing,
}

impl ProcessLogs {
    fn ring_mut(&mut self, stream: StreamKind) -> &mut StreamRing {
        match stream {
            StreamKind::Stdout => &mut self.stdout,
            StreamKind::Stderr => &mut self.stderr,
        }
    }

    fn ring(&self, stream: StreamKind) -> &StreamRing {
        match stream {
            StreamKind::Stdout => &self.stdout,
            StreamKind::Stderr => &self.stderr,
        }
    }
}

/// Bounded in-memory log rings plus a live follow channel.
pub struct LogStore {
    capacity: usize,
    inner: Mutex<HashMap<String, ProcessLogs>>,
    live: broadcast::Sender<LogEntry>,
    file_tx: Option<mpsc::UnboundedSender<LogWrite>>,
}

impl LogStore {
    /// In-memory store only (tests, paused pipelines).
    pub fn new(capacity: usize) -> Self {
        let (live, _) = broadcast::channel(1024);
        Self { capacity, inner: Mutex::new(HashMap::new()), live, file_tx: None }
    }

    /// Store with a file mirror; pair with [`LogWriter::spawn`].
    pub fn with_writer(capacity: usize, file_tx: mpsc::UnboundedSender<LogWrite>) -> Self {
        let (live, _) = broadcast::channel(1024);
        Self { capacity, inner: Mutex::new(HashMap::new()), live, file_tx: Some(file_tx) }
    }

    /// Pre-create a process's rings so `tail` works before the first line.
    pub fn register(&self, process: &str) {
        self.inner.lock().entry(process.to_string()).or_default();
    }

    pub fn contains(&self, process: &str) -> bool {
        self.inner.lock().contains_key(process)
    }

    /// Append one line, assigning the next sequence number for its stream.
    pub fn append(&self, process: &str, stream: StreamKind, line: &str, epoch_ms: u64) -> LogEntry {
        let mut inner = self.inner.lock();
        let logs = inner.entry(process.to_string()).or_default();
        let ring = logs.ring_mut(stream);

        let entry = LogEntry {
            process_name: process.to_string(),
            stream,
            line: line.to_string(),
            seq: ring.next_seq,
            epoch_ms,
        };
        ring.next_seq += 1;
        if ring.entries.len() == self.capacity {
            ring.entries.pop_front();
        }
        ring.entries.push_back(entry.clone());

        // Send under the lock so the live feed preserves seq order.
        let _ = self.live.send(entry.clone());
        if let Some(tx) = &self.file_tx {
            let _ = tx.send(LogWrite::Entry(entry.clone()));
        }
        entry
    }

    /// The most recent `n` entries. With no stream filter, both streams
    /// are interleaved by timestamp. Returns `None` for unknown processes.
    pub fn tail(
        &self,
        process: &str,
        stream: Option<StreamKind>,
        n: usize,
    ) -> Option<Vec<LogEntry>> {
        let inner = self.inner.lock();
        let logs = inner.get(process)?;
        let mut entries: Vec<LogEntry> = match stream {
            Some(kind) => logs.ring(kind).entries.iter().cloned().collect(),
            None => {
                let mut merged: Vec<LogEntry> = logs
                    .stdout
                    .entries
                    .iter()
                    .chain(logs.stderr.entries.iter())
                    .cloned()
                    .collect();
                merged.sort_by_key(|e| (e.epoch_ms, e.seq));
                merged
            }
        };
        if entries.len() > n {
            entries.drain(..entries.len() - n);
        }
        Some(entries)
    }

    /// Buffered entries at or above each stream's watermark, both
    /// streams, in timestamp order. Watermarks are per stream because
    /// sequence numbers are: a stdout cutoff must never starve stderr.
    /// Streams absent from the map replay from the start. The streaming
    /// handler replays these before following the live feed.
    pub fn snapshot_from(
        &self,
        process: &str,
        from_seq: &HashMap<StreamKind, u64>,
    ) -> Option<Vec<LogEntry>> {
        let inner = self.inner.lock();
        let logs = inner.get(process)?;
        let mut entries: Vec<LogEntry> = logs
            .stdout
            .entries
            .iter()
            .chain(logs.stderr.entries.iter())
            .filter(|e| e.seq >= from_seq.get(&e.stream).copied().unwrap_or(0))
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.epoch_ms, e.seq));
        Some(entries)
    }

    /// Next sequence number for a stream (also the count of appends ever
    /// made to it).
    pub fn next_seq(&self, process: &str, stream: StreamKind) -> Option<u64> {
        let inner = self.inner.lock();
        Some(inner.get(process)?.ring(stream).next_seq)
    }

    /// Empty rings (one process, or all). Sequence counters are kept so
    /// later appends continue above the pre-clear maximum. Returns false
    /// when a named process is unknown.
    pub fn clear(&self, process: Option<&str>) -> bool {
        let mut inner = self.inner.lock();
        match process {
            Some(name) => match inner.get_mut(name) {
                Some(logs) => {
                    logs.stdout.entries.clear();
                    logs.stderr.entries.clear();
                }
                None => return false,
            },
            None => {
                for logs in inner.values_mut() {
                    logs.stdout.entries.clear();
                    logs.stderr.entries.clear();
                }
            }
        }
        if let Some(tx) = &self.file_tx {
            let _ = tx.send(LogWrite::Clear { process: process.map(str::to_string) });
        }
        true
    }

    /// Live feed of every append, all processes. Receivers filter.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.live.subscribe()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem watching for configured path globs.
//!
//! One `notify` watcher covers the roots derived from every watch spec's
//! globs. Raw events are bridged onto a channel, filtered by glob,
//! classified, and debounced per watch spec (last-seen path wins) before
//! being published as `file.changed`. Symlinks are not followed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clier_core::pipeline::WatchSpec;
use clier_core::{ClierEvent, Clock, FileChangeKind};
use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::debounce::Debouncer;
use crate::event_bus::EventBus;

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("watch setup failed: {0}")]
    Notify(#[from] notify::Error),

    #[error("invalid watch glob {0:?}: {1}")]
    Glob(String, glob::PatternError),
}

struct CompiledWatch {
    id: String,
    patterns: Vec<glob::Pattern>,
    debouncer: Debouncer,
}

/// Running watcher; dropping it stops both the OS watcher and the
/// bridge task.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl FileWatcher {
    /// Start watching. Returns `None` when no watch specs are configured.
    pub fn spawn<C: Clock>(
        project_root: &Path,
        watches: &[WatchSpec],
        bus: EventBus,
        clock: C,
    ) -> Result<Option<Self>, WatcherError> {
        if watches.is_empty() {
            return Ok(None);
        }

        let mut compiled = Vec::with_capacity(watches.len());
        for spec in watches {
            let patterns = spec
                .patterns
                .iter()
                .map(|p| {
                    glob::Pattern::new(p).map_err(|e| WatcherError::Glob(p.clone(), e))
                })
                .collect::<Result<Vec<_>, _>>()?;
            compiled.push(CompiledWatch {
                id: spec.id.clone(),
                patterns,
                debouncer: Debouncer::new(Duration::from_millis(spec.debounce_ms)),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(
            move |result: Result<notify::Event, notify::Error>| {
                let _ = tx.send(result);
            },
        )?;

        for root in watch_roots(project_root, watches) {
            if root.exists() {
                watcher.watch(&root, RecursiveMode::Recursive)?;
                debug!(root = %root.display(), "watching");
            } else {
                warn!(root = %root.display(), "watch root does not exist, skipping");
            }
        }

        let task = tokio::spawn(run_bridge(
            project_root.to_path_buf(),
            compiled,
            rx,
            bus,
            clock,
        ));
        Ok(Some(Self { _watcher: watcher, task }))
    }

    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_bridge<C: Clock>(
    project_root: PathBuf,
    compiled: Vec<CompiledWatch>,
    mut rx: mpsc::UnboundedReceiver<Result<notify::Event, notify::Error>>,
    bus: EventBus,
    clock: C,
) {
    let compiled = Arc::new(compiled);
    // Last change seen per watch spec, published when its window closes
    let pending: Arc<Mutex<HashMap<String, (PathBuf, FileChangeKind)>>> =
        Arc::new(Mutex::new(HashMap::new()));

    while let Some(result) = rx.recv().await {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "watch error");
                continue;
            }
        };
        let Some(kind) = classify(&event.kind) else {
            continue;
        };

        for path in &event.paths {
            let Ok(relative) = path.strip_prefix(&project_root) else {
                continue;
            };
            for watch in compiled.iter() {
                if !watch.patterns.iter().any(|p| p.matches_path(relative)) {
                    continue;
                }
                pending.lock().insert(watch.id.clone(), (path.clone(), kind));

                let bus = bus.clone();
                let clock = clock.clone();
                let pending = Arc::clone(&pending);
                let id = watch.id.clone();
                watch.debouncer.debounce(&watch.id, move || {
                    if let Some((path, kind)) = pending.lock().remove(&id) {
                        bus.publish(&ClierEvent::file_changed(
                            &id,
                            &path,
                            kind,
                            clock.epoch_ms(),
                        ));
                    }
                });
            }
        }
    }
}

/// Map raw notify kinds to the reported change kinds; access and metadata
/// noise is dropped.
fn classify(kind: &EventKind) -> Option<FileChangeKind> {
    match kind {
        EventKind::Create(_) => Some(FileChangeKind::Created),
        EventKind::Remove(_) => Some(FileChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Data(_))
        | EventKind::Modify(ModifyKind::Name(_))
        | EventKind::Modify(ModifyKind::Any) => Some(FileChangeKind::Modified),
        _ => None,
    }
}

/// The directories to register with the OS watcher: each glob's longest
/// literal prefix, resolved under the project root.
fn watch_roots(project_root: &Path, watches: &[WatchSpec]) -> Vec<PathBuf> {
    let mut roots = Vec::new();
    for spec in watches {
        for pattern in &spec.patterns {
            let mut prefix = PathBuf::new();
            for component in Path::new(pattern).components() {
                let text = component.as_os_str().to_string_lossy();
                if text.contains(['*', '?', '[']) {
                    break;
                }
                prefix.push(component);
            }
            let root = project_root.join(prefix);
            if !roots.contains(&root) {
                roots.push(root);
            }
        }
    }
    roots
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;

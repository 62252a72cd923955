// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use clier_core::SystemClock;

fn watch(id: &str, patterns: &[&str], debounce_ms: u64) -> WatchSpec {
    WatchSpec {
        id: id.to_string(),
        patterns: patterns.iter().map(|s| s.to_string()).collect(),
        debounce_ms,
        targets: Vec::new(),
    }
}

#[test]
fn watch_roots_use_longest_literal_prefix() {
    let root = Path::new("/project");
    let watches = vec![
        watch("a", &["src/**"], 100),
        watch("b", &["src/**/*.rs"], 100),
        watch("c", &["assets/images/*.png"], 100),
        watch("d", &["*.toml"], 100),
    ];
    let roots = watch_roots(root, &watches);
    assert_eq!(
        roots,
        vec![
            PathBuf::from("/project/src"),
            PathBuf::from("/project/assets/images"),
            PathBuf::from("/project"),
        ]
    );
}

#[test]
fn classify_filters_noise() {
    use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind};

    assert_eq!(
        classify(&EventKind::Create(CreateKind::File)),
        Some(FileChangeKind::Created)
    );
    assert_eq!(
        classify(&EventKind::Remove(RemoveKind::File)),
        Some(FileChangeKind::Deleted)
    );
    assert_eq!(
        classify(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
        Some(FileChangeKind::Modified)
    );
    assert_eq!(classify(&EventKind::Access(AccessKind::Read)), None);
}

#[tokio::test]
async fn burst_of_touches_yields_single_event() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    std::fs::create_dir_all(&src).unwrap();

    let bus = EventBus::new();
    let mut events = bus.subscribe("file.changed");
    let watcher = FileWatcher::spawn(
        dir.path(),
        &[watch("src-watch", &["src/**"], 100)],
        bus.clone(),
        SystemClock,
    )
    .unwrap()
    .unwrap();

    // Let the OS watcher finish registering
    tokio::time::sleep(Duration::from_millis(250)).await;

    for i in 0..5 {
        std::fs::write(src.join(format!("file{i}.rs")), "fn main() {}").unwrap();
    }

    let event = tokio::time::timeout(Duration::from_secs(3), events.recv())
        .await
        .expect("expected a file.changed event")
        .unwrap();
    assert_eq!(event.name, "file.changed");
    assert_eq!(event.process_name, "src-watch");
    let data = event.data.unwrap();
    assert!(data["path"].as_str().unwrap().contains("file"));

    // The burst coalesced: no second event follows
    let extra = tokio::time::timeout(Duration::from_millis(400), events.recv()).await;
    assert!(extra.is_err(), "burst must coalesce into one event, got {extra:?}");

    watcher.shutdown();
}

#[tokio::test]
async fn changes_outside_patterns_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::create_dir_all(dir.path().join("target")).unwrap();

    let bus = EventBus::new();
    let mut events = bus.subscribe("file.changed");
    let _watcher = FileWatcher::spawn(
        dir.path(),
        &[watch("src-watch", &["src/**"], 50)],
        bus.clone(),
        SystemClock,
    )
    .unwrap()
    .unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    std::fs::write(dir.path().join("target/out.bin"), "x").unwrap();

    let got = tokio::time::timeout(Duration::from_millis(500), events.recv()).await;
    assert!(got.is_err(), "out-of-pattern change must not publish, got {got:?}");
}

#[test]
fn no_watch_specs_means_no_watcher() {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let _guard = runtime.enter();
    let result = FileWatcher::spawn(Path::new("/tmp"), &[], EventBus::new(), SystemClock).unwrap();
    assert!(result.is_none());
}

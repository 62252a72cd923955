// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn exit_event_type_follows_code() {
    let clean = ClierEvent::exit("web", Some(0), 1);
    assert_eq!(clean.event_type, EventType::Success);
    assert_eq!(clean.name, "web:exit");

    let failed = ClierEvent::exit("web", Some(1), 1);
    assert_eq!(failed.event_type, EventType::Error);

    let signalled = ClierEvent::exit("web", None, 1);
    assert_eq!(signalled.event_type, EventType::Error);
}

#[test]
fn custom_event_name_is_process_scoped() {
    let event = ClierEvent::custom("build", "done", serde_json::json!({"ok": true}), 42);
    assert_eq!(event.name, "build:done");
    assert_eq!(event.process_name, "build");
    assert_eq!(event.event_type, EventType::Custom);
}

#[test]
fn serde_round_trip_preserves_type_tag() {
    let event = ClierEvent::output("api", true, "boom", 7);
    let json = serde_json::to_string(&event).unwrap();
    assert!(json.contains("\"type\":\"stderr\""), "got: {json}");

    let back: ClierEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(back, event);
}

#[test]
fn file_changed_carries_path_and_kind() {
    let event = ClierEvent::file_changed(
        "src-watch",
        std::path::Path::new("src/main.rs"),
        FileChangeKind::Modified,
        9,
    );
    assert_eq!(event.name, "file.changed");
    let data = event.data.unwrap();
    assert_eq!(data["path"], "src/main.rs");
    assert_eq!(data["kind"], "modified");
}

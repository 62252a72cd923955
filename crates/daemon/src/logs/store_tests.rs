// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn tail_returns_most_recent_entries() {
    let store = LogStore::new(100);
    for i in 0..10 {
        store.append("web", StreamKind::Stdout, &format!("line {i}"), i);
    }

    let tail = store.tail("web", Some(StreamKind::Stdout), 3).unwrap();
    let lines: Vec<&str> = tail.iter().map(|e| e.line.as_str()).collect();
    assert_eq!(lines, vec!["line 7", "line 8", "line 9"]);
}

#[test]
fn tail_unknown_process_is_none() {
    let store = LogStore::new(100);
    assert!(store.tail("ghost", None, 10).is_none());
}

#[test]
fn registered_process_tails_empty() {
    let store = LogStore::new(100);
    store.register("web");
    assert_eq!(store.tail("web", None, 10).unwrap().len(), 0);
}

#[test]
fn sequence_numbers_are_strictly_increasing_per_stream() {
    let store = LogStore::new(100);
    let a = store.append("web", StreamKind::Stdout, "a", 0);
    let b = store.append("web", StreamKind::Stdout, "b", 0);
    let first_err = store.append("web", StreamKind::Stderr, "x", 0);

    assert_eq!(a.seq, 0);
    assert_eq!(b.seq, 1);
    // Streams number independently
    assert_eq!(first_err.seq, 0);
}

#[test]
fn ring_capacity_drops_oldest() {
    let store = LogStore::new(3);
    for i in 0..5 {
        store.append("web", StreamKind::Stdout, &format!("line {i}"), i);
    }
    let tail = store.tail("web", Some(StreamKind::Stdout), 10).unwrap();
    assert_eq!(tail.len(), 3);
    assert_eq!(tail[0].line, "line 2");
    assert_eq!(tail[0].seq, 2);
}

#[test]
fn clear_empties_but_keeps_sequence_counter() {
    let store = LogStore::new(100);
    for i in 0..10 {
        store.append("web", StreamKind::Stdout, &format!("line {i}"), i);
    }
    assert!(store.clear(Some("web")));
    assert_eq!(store.tail("web", None, 10).unwrap().len(), 0);

    let next = store.append("web", StreamKind::Stdout, "after clear", 99);
    assert_eq!(next.seq, 10, "appends continue above the pre-clear maximum");
}

#[test]
fn clear_unknown_process_is_false() {
    let store = LogStore::new(100);
    assert!(!store.clear(Some("ghost")));
}

#[test]
fn clear_all_covers_every_process() {
    let store = LogStore::new(100);
    store.append("a", StreamKind::Stdout, "x", 0);
    store.append("b", StreamKind::Stderr, "y", 0);
    assert!(store.clear(None));
    assert_eq!(store.tail("a", None, 10).unwrap().len(), 0);
    assert_eq!(store.tail("b", None, 10).unwrap().len(), 0);
}

#[test]
fn merged_tail_interleaves_by_timestamp() {
    let store = LogStore::new(100);
    store.append("web", StreamKind::Stdout, "first", 1);
    store.append("web", StreamKind::Stderr, "second", 2);
    store.append("web", StreamKind::Stdout, "third", 3);

    let tail = store.tail("web", None, 10).unwrap();
    let lines: Vec<&str> = tail.iter().map(|e| e.line.as_str()).collect();
    assert_eq!(lines, vec!["first", "second", "third"]);
}

#[test]
fn snapshot_applies_watermarks_per_stream() {
    let store = LogStore::new(100);
    // stdout races ahead of stderr, as in any real process
    for i in 0..6 {
        store.append("web", StreamKind::Stdout, &format!("out {i}"), i);
    }
    store.append("web", StreamKind::Stderr, "err 0", 10);
    store.append("web", StreamKind::Stderr, "err 1", 11);

    let from = HashMap::from([(StreamKind::Stdout, 4), (StreamKind::Stderr, 1)]);
    let snapshot = store.snapshot_from("web", &from).unwrap();
    let lines: Vec<&str> = snapshot.iter().map(|e| e.line.as_str()).collect();
    assert_eq!(lines, vec!["out 4", "out 5", "err 1"]);
}

#[test]
fn snapshot_watermark_on_one_stream_never_starves_the_other() {
    let store = LogStore::new(100);
    for i in 0..3 {
        store.append("web", StreamKind::Stdout, &format!("out {i}"), i);
        store.append("web", StreamKind::Stderr, &format!("err {i}"), i);
    }

    // A stdout watermark far past stderr's ceiling must not touch stderr
    let from = HashMap::from([(StreamKind::Stdout, 100)]);
    let snapshot = store.snapshot_from("web", &from).unwrap();
    let lines: Vec<&str> = snapshot.iter().map(|e| e.line.as_str()).collect();
    assert_eq!(lines, vec!["err 0", "err 1", "err 2"]);
}

#[test]
fn snapshot_with_no_watermarks_replays_everything() {
    let store = LogStore::new(100);
    store.append("web", StreamKind::Stdout, "out", 0);
    store.append("web", StreamKind::Stderr, "err", 1);
    let snapshot = store.snapshot_from("web", &HashMap::new()).unwrap();
    assert_eq!(snapshot.len(), 2);
}

#[tokio::test]
async fn live_feed_sees_appends_in_order() {
    let store = LogStore::new(100);
    let mut rx = store.subscribe();

    store.append("web", StreamKind::Stdout, "one", 1);
    store.append("web", StreamKind::Stdout, "two", 2);

    assert_eq!(rx.recv().await.unwrap().line, "one");
    assert_eq!(rx.recv().await.unwrap().line, "two");
}

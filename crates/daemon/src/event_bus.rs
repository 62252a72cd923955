// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process publish/subscribe over event names.
//!
//! Subscribers register a literal name or a `*`-glob and receive matching
//! events over their own unbounded FIFO channel, so one slow consumer
//! never holds up the rest. Delivery within a single publish follows
//! subscription order; closed receivers are pruned on the next publish.

use std::sync::Arc;

use clier_core::ClierEvent;
use parking_lot::Mutex;
use tokio::sync::mpsc;

struct Subscriber {
    pattern: String,
    tx: mpsc::UnboundedSender<ClierEvent>,
}

/// Shared pub/sub hub. Cheap to clone; all clones deliver to the same
/// subscription table.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { subscribers: Arc::new(Mutex::new(Vec::new())) }
    }

    /// Subscribe to events whose name matches `pattern` (literal, or glob
    /// with `*`). Dropping the receiver unsubscribes.
    pub fn subscribe(&self, pattern: &str) -> mpsc::UnboundedReceiver<ClierEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(Subscriber { pattern: pattern.to_string(), tx });
        rx
    }

    /// Deliver an event to every matching subscriber.
    pub fn publish(&self, event: &ClierEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|sub| {
            if !name_matches(&sub.pattern, &event.name) {
                return !sub.tx.is_closed();
            }
            sub.tx.send(event.clone()).is_ok()
        });
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Match an event name against a subscription pattern. `*` matches any
/// run of characters (including none); everything else is literal.
pub fn name_matches(pattern: &str, name: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == name;
    }

    let mut pieces = pattern.split('*');
    // First piece anchors at the start, last at the end.
    let first = pieces.next().unwrap_or("");
    if !name.starts_with(first) {
        return false;
    }
    let mut rest = &name[first.len()..];

    let pieces: Vec<&str> = pieces.collect();
    for (i, piece) in pieces.iter().enumerate() {
        if piece.is_empty() {
            continue;
        }
        let last = i == pieces.len() - 1;
        if last && !pattern.ends_with('*') {
            return rest.ends_with(piece) && rest.len() >= piece.len();
        }
        match rest.find(piece) {
            Some(pos) => rest = &rest[pos + piece.len()..],
            None => return false,
        }
    }
    true
}

#[cfg(test)]
#[path = "event_bus_tests.rs"]
mod tests;

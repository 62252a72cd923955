// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clier daemon library.
//!
//! The supervision kernel: per-process supervisors driven by an
//! orchestrator over a shared event bus, guarded by circuit breakers,
//! restarted on debounced file changes, and exposed over a Unix-socket
//! IPC listener.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod breaker;
pub mod debounce;
pub mod env;
pub mod event_bus;
pub mod lifecycle;
pub mod listener;
pub mod logs;
pub mod orchestrator;
pub mod supervisor;
pub mod watcher;

pub use breaker::{CircuitBreaker, CircuitState, RejectedStart};
pub use debounce::Debouncer;
pub use event_bus::EventBus;
pub use lifecycle::{startup, Config, DaemonState, LifecycleError};
pub use logs::LogStore;
pub use orchestrator::{DaemonOrchestrator, Orchestrator};
pub use supervisor::{Supervisor, SupervisorError};
pub use watcher::FileWatcher;

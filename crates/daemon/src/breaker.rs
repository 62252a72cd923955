// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Circuit breaker guarding a process against crash loops.
//!
//! Closed counts failures inside a rolling window; at the threshold the
//! circuit opens and every start is rejected until the cooldown elapses.
//! Half-open admits exactly one probe: success closes the circuit,
//! failure reopens it.

use std::time::{Duration, Instant};

use clier_core::pipeline::BreakerConfig;
use clier_core::Clock;
use parking_lot::Mutex;

/// Breaker position, as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "halfOpen",
        }
    }
}

/// Start refused while the circuit is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectedStart {
    pub retry_after_ms: u64,
}

struct Record {
    state: CircuitState,
    failures: u32,
    first_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
    /// Half-open probe in flight; further starts are rejected until it
    /// reports success or failure.
    probing: bool,
}

/// Per-process circuit breaker.
pub struct CircuitBreaker<C: Clock> {
    config: BreakerConfig,
    clock: C,
    record: Mutex<Record>,
}

impl<C: Clock> CircuitBreaker<C> {
    pub fn new(config: BreakerConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            record: Mutex::new(Record {
                state: CircuitState::Closed,
                failures: 0,
                first_failure_at: None,
                opened_at: None,
                probing: false,
            }),
        }
    }

    /// Ask permission to start. Open circuits reject with a retry hint;
    /// half-open circuits admit a single probe.
    pub fn attempt_start(&self) -> Result<(), RejectedStart> {
        let now = self.clock.now();
        let mut record = self.record.lock();
        self.advance(&mut record, now);

        match record.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = record.opened_at.map(|t| now - t).unwrap_or_default();
                let cooldown = Duration::from_millis(self.config.cooldown_ms);
                let remaining = cooldown.saturating_sub(elapsed);
                Err(RejectedStart { retry_after_ms: remaining.as_millis() as u64 })
            }
            CircuitState::HalfOpen => {
                if record.probing {
                    Err(RejectedStart { retry_after_ms: self.config.cooldown_ms })
                } else {
                    record.probing = true;
                    Ok(())
                }
            }
        }
    }

    /// The guarded process proved healthy; reset to closed.
    pub fn record_success(&self) {
        let mut record = self.record.lock();
        record.state = CircuitState::Closed;
        record.failures = 0;
        record.first_failure_at = None;
        record.opened_at = None;
        record.probing = false;
    }

    /// The guarded process failed. A failed half-open probe reopens the
    /// circuit; in closed, failures accumulate within the window.
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut record = self.record.lock();
        self.advance(&mut record, now);

        match record.state {
            CircuitState::HalfOpen | CircuitState::Open => {
                record.state = CircuitState::Open;
                record.opened_at = Some(now);
                record.probing = false;
            }
            CircuitState::Closed => {
                let window = Duration::from_millis(self.config.window_ms);
                let in_window = record
                    .first_failure_at
                    .map(|first| now - first <= window)
                    .unwrap_or(false);
                if in_window {
                    record.failures += 1;
                } else {
                    record.failures = 1;
                    record.first_failure_at = Some(now);
                }
                if record.failures >= self.config.threshold {
                    record.state = CircuitState::Open;
                    record.opened_at = Some(now);
                }
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        let now = self.clock.now();
        let mut record = self.record.lock();
        self.advance(&mut record, now);
        record.state
    }

    /// Open circuits move to half-open once the cooldown has elapsed.
    fn advance(&self, record: &mut Record, now: Instant) {
        if record.state == CircuitState::Open {
            let cooldown = Duration::from_millis(self.config.cooldown_ms);
            if record.opened_at.map(|t| now - t >= cooldown).unwrap_or(false) {
                record.state = CircuitState::HalfOpen;
                record.probing = false;
            }
        }
    }
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;

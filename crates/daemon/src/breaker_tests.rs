// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use clier_core::FakeClock;

fn breaker(clock: &FakeClock) -> CircuitBreaker<FakeClock> {
    CircuitBreaker::new(
        BreakerConfig { threshold: 3, window_ms: 10_000, cooldown_ms: 5_000 },
        clock.clone(),
    )
}

#[test]
fn stays_closed_below_threshold() {
    let clock = FakeClock::new();
    let breaker = breaker(&clock);

    breaker.record_failure();
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert!(breaker.attempt_start().is_ok());
}

#[test]
fn opens_at_threshold_within_window() {
    let clock = FakeClock::new();
    let breaker = breaker(&clock);

    for _ in 0..3 {
        breaker.record_failure();
        clock.advance(Duration::from_millis(100));
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    let rejected = breaker.attempt_start().unwrap_err();
    assert!(rejected.retry_after_ms <= 5_000);
    assert!(rejected.retry_after_ms > 0);
}

#[test]
fn failures_outside_window_restart_the_count() {
    let clock = FakeClock::new();
    let breaker = breaker(&clock);

    breaker.record_failure();
    breaker.record_failure();
    clock.advance(Duration::from_millis(11_000));
    breaker.record_failure();
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Closed);

    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[test]
fn open_rejects_until_cooldown_elapses() {
    let clock = FakeClock::new();
    let breaker = breaker(&clock);
    for _ in 0..3 {
        breaker.record_failure();
    }

    clock.advance(Duration::from_millis(4_999));
    assert!(breaker.attempt_start().is_err());

    clock.advance(Duration::from_millis(1));
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    assert!(breaker.attempt_start().is_ok());
}

#[test]
fn half_open_admits_exactly_one_probe() {
    let clock = FakeClock::new();
    let breaker = breaker(&clock);
    for _ in 0..3 {
        breaker.record_failure();
    }
    clock.advance(Duration::from_millis(5_000));

    assert!(breaker.attempt_start().is_ok());
    assert!(breaker.attempt_start().is_err(), "second probe must be rejected");
}

#[test]
fn probe_success_closes_the_circuit() {
    let clock = FakeClock::new();
    let breaker = breaker(&clock);
    for _ in 0..3 {
        breaker.record_failure();
    }
    clock.advance(Duration::from_millis(5_000));
    assert!(breaker.attempt_start().is_ok());

    breaker.record_success();
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert!(breaker.attempt_start().is_ok());
}

#[test]
fn probe_failure_reopens_with_fresh_cooldown() {
    let clock = FakeClock::new();
    let breaker = breaker(&clock);
    for _ in 0..3 {
        breaker.record_failure();
    }
    clock.advance(Duration::from_millis(5_000));
    assert!(breaker.attempt_start().is_ok());

    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Open);

    // Cooldown restarts from the probe failure
    clock.advance(Duration::from_millis(4_999));
    assert!(breaker.attempt_start().is_err());
    clock.advance(Duration::from_millis(1));
    assert!(breaker.attempt_start().is_ok());
}

#[test]
fn success_resets_failure_count() {
    let clock = FakeClock::new();
    let breaker = breaker(&clock);

    breaker.record_failure();
    breaker.record_failure();
    breaker.record_success();
    breaker.record_failure();
    breaker.record_failure();
    assert_eq!(breaker.state(), CircuitState::Closed);
}

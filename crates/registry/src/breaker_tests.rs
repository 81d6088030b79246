// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn settings() -> BreakerSettings {
    BreakerSettings {
        failure_threshold: 5,
        cooldown_ms: 300_000,
        success_threshold: 2,
    }
}

fn breaker() -> CircuitBreaker {
    CircuitBreaker::new("p1/i1", settings())
}

#[test]
fn starts_closed() {
    let b = breaker();
    assert_eq!(b.state(), BreakerState::Closed);
    assert!(b.would_allow(0));
}

#[test]
fn opens_after_consecutive_failures() {
    let mut b = breaker();
    for _ in 0..4 {
        b.record_failure(1_000);
        assert_eq!(b.state(), BreakerState::Closed);
    }
    b.record_failure(1_000);
    assert_eq!(b.state(), BreakerState::Open);
    assert!(!b.allow(1_001));
}

#[test]
fn success_in_closed_resets_failure_count() {
    let mut b = breaker();
    for _ in 0..4 {
        b.record_failure(1_000);
    }
    b.record_success();
    for _ in 0..4 {
        b.record_failure(2_000);
    }
    assert_eq!(b.state(), BreakerState::Closed);
}

#[test]
fn cooldown_admits_half_open_probe() {
    let mut b = breaker();
    for _ in 0..5 {
        b.record_failure(1_000);
    }
    assert!(!b.allow(1_000 + 299_999));
    assert_eq!(b.state(), BreakerState::Open);

    assert!(b.allow(1_000 + 300_000));
    assert_eq!(b.state(), BreakerState::HalfOpen);
}

#[test]
fn half_open_closes_after_success_threshold() {
    let mut b = breaker();
    for _ in 0..5 {
        b.record_failure(1_000);
    }
    assert!(b.allow(400_000));
    b.record_success();
    assert_eq!(b.state(), BreakerState::HalfOpen);
    b.record_success();
    assert_eq!(b.state(), BreakerState::Closed);
}

#[test]
fn half_open_failure_reopens_with_fresh_cooldown() {
    let mut b = breaker();
    for _ in 0..5 {
        b.record_failure(1_000);
    }
    assert!(b.allow(400_000));
    b.record_failure(400_000);
    assert_eq!(b.state(), BreakerState::Open);

    // The original failure time no longer counts.
    assert!(!b.would_allow(400_000 + 299_999));
    assert!(b.would_allow(400_000 + 300_000));
}

#[test]
fn would_allow_does_not_mutate() {
    let mut b = breaker();
    for _ in 0..5 {
        b.record_failure(1_000);
    }
    assert!(b.would_allow(400_000));
    assert_eq!(b.state(), BreakerState::Open);
}

#[test]
fn tracks_time_since_last_failure() {
    let mut b = breaker();
    assert_eq!(b.ms_since_last_failure(50), None);
    b.record_failure(1_000);
    assert_eq!(b.ms_since_last_failure(1_750), Some(750));
}

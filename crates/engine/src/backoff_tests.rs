// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use qrunner_core::FakeClock;
use std::time::Duration;

#[test]
fn unset_key_is_not_suppressed() {
    let registry = BackoffRegistry::new(FakeClock::new());
    assert!(!registry.get("p/q"));
}

#[test]
fn set_then_get_before_expiry_is_suppressed() {
    let clock = FakeClock::new();
    let registry = BackoffRegistry::new(clock.clone());
    registry.set("p/q", Duration::from_secs(10));
    assert!(registry.get("p/q"));
}

#[test]
fn get_after_ttl_elapses_returns_false() {
    let clock = FakeClock::new();
    let registry = BackoffRegistry::new(clock.clone());
    registry.set("p/q", Duration::from_secs(10));
    clock.advance(Duration::from_secs(11));
    assert!(!registry.get("p/q"));
}

#[test]
fn repeated_set_overwrites_prior_expiry() {
    let clock = FakeClock::new();
    let registry = BackoffRegistry::new(clock.clone());
    registry.set("p/q", Duration::from_secs(1));
    registry.set("p/q", Duration::from_secs(100));
    clock.advance(Duration::from_secs(2));
    assert!(registry.get("p/q"));
}

#[test]
fn purge_expired_drops_stale_entries() {
    let clock = FakeClock::new();
    let registry = BackoffRegistry::new(clock.clone());
    registry.set("p/q1", Duration::from_secs(1));
    registry.set("p/q2", Duration::from_secs(100));
    clock.advance(Duration::from_secs(2));
    registry.purge_expired();
    assert_eq!(registry.len(), 1);
}

#[test]
fn next_failure_ttl_doubles_up_to_max() {
    assert_eq!(ttl::next_failure_ttl(None), ttl::AFTER_HARD_ERROR);
    assert_eq!(
        ttl::next_failure_ttl(Some(Duration::from_secs(10))),
        Duration::from_secs(20)
    );
    assert_eq!(ttl::next_failure_ttl(Some(ttl::MAX)), ttl::MAX);
    assert_eq!(
        ttl::next_failure_ttl(Some(Duration::from_secs(170))),
        ttl::MAX
    );
}

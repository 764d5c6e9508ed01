// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn first_acquire_succeeds_second_fails() {
    let registry = BusyRegistry::new();
    assert!(registry.try_acquire("p/q"));
    assert!(!registry.try_acquire("p/q"));
}

#[test]
fn release_then_reacquire_succeeds() {
    let registry = BusyRegistry::new();
    assert!(registry.try_acquire("p/q"));
    registry.release("p/q");
    assert!(registry.try_acquire("p/q"));
}

#[test]
fn release_is_idempotent() {
    let registry = BusyRegistry::new();
    registry.release("never-held");
    registry.release("never-held");
}

#[test]
fn distinct_keys_do_not_interfere() {
    let registry = BusyRegistry::new();
    assert!(registry.try_acquire("p/q1"));
    assert!(registry.try_acquire("p/q2"));
}

#[test]
fn guard_releases_on_drop() {
    let registry = BusyRegistry::new();
    {
        let _guard = registry.try_acquire_guard("p/q").expect("should acquire");
        assert!(registry.is_busy("p/q"));
    }
    assert!(!registry.is_busy("p/q"));
}

#[test]
fn guard_returns_none_when_already_held() {
    let registry = BusyRegistry::new();
    let _first = registry.try_acquire_guard("p/q").expect("should acquire");
    assert!(registry.try_acquire_guard("p/q").is_none());
}

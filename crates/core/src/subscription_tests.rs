// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fresh_subscription_is_idle_with_no_history() {
    let sub = SubscriptionSnapshot::new(QueueName::new("q"));
    assert!(sub.is_idle());
    assert!(sub.last_resources.is_none());
    assert!(sub.exec_time_short.is_none());
}

#[test]
fn in_flight_subscription_is_not_idle() {
    let mut sub = SubscriptionSnapshot::new(QueueName::new("q"));
    sub.in_flight = 1;
    assert!(!sub.is_idle());
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fresh_ema_has_no_estimate() {
    let ema = DualEma::new();
    assert_eq!(ema.short_estimate(), None);
    assert_eq!(ema.long_estimate(), None);
}

#[test]
fn first_sample_becomes_the_estimate() {
    let mut ema = DualEma::new();
    ema.record(Duration::from_secs(30), Duration::ZERO);
    assert_eq!(ema.short_estimate(), Some(Duration::from_secs(30)));
    assert_eq!(ema.long_estimate(), Some(Duration::from_secs(30)));
}

#[test]
fn sample_one_half_life_later_halves_old_weight() {
    let mut ema = DualEma::new();
    ema.record(Duration::from_secs(0), Duration::ZERO);
    ema.record(Duration::from_secs(100), Duration::from_secs(10 * 60));
    let short = ema.short_estimate().unwrap().as_secs_f64();
    assert!((short - 50.0).abs() < 1e-6);
}

#[test]
fn long_window_decays_slower_than_short_window() {
    let mut ema = DualEma::new();
    ema.record(Duration::from_secs(0), Duration::ZERO);
    ema.record(Duration::from_secs(100), Duration::from_secs(5 * 60));
    let short = ema.short_estimate().unwrap().as_secs_f64();
    let long = ema.long_estimate().unwrap().as_secs_f64();
    assert!(short > long, "short={short} long={long}");
}

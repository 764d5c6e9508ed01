// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution-time exponential moving average, kept per queue with two
//! windows (10 min, 1 h half-life), per spec.md §3.

use std::time::Duration;

/// A single EMA window, parameterized by half-life.
#[derive(Debug, Clone, Copy)]
struct EmaWindow {
    half_life: Duration,
    value: Option<f64>,
}

impl EmaWindow {
    fn new(half_life: Duration) -> Self {
        Self {
            half_life,
            value: None,
        }
    }

    /// Fold in a new sample taken `elapsed_since_last` after the previous
    /// one. The decay factor is `0.5^(elapsed / half_life)`, so a sample
    /// arriving exactly one half-life after the last one halves the old
    /// value's weight.
    fn record(&mut self, sample_secs: f64, elapsed_since_last: Duration) {
        match self.value {
            None => self.value = Some(sample_secs),
            Some(prev) => {
                let decay =
                    0.5_f64.powf(elapsed_since_last.as_secs_f64() / self.half_life.as_secs_f64());
                self.value = Some(prev * decay + sample_secs * (1.0 - decay));
            }
        }
    }
}

/// The ten-minute and one-hour execution-time EMAs for a single queue.
#[derive(Debug, Clone)]
pub struct DualEma {
    short: EmaWindow,
    long: EmaWindow,
}

impl DualEma {
    pub fn new() -> Self {
        Self {
            short: EmaWindow::new(Duration::from_secs(10 * 60)),
            long: EmaWindow::new(Duration::from_secs(60 * 60)),
        }
    }

    /// Record a completed task's execution duration. `elapsed_since_last`
    /// is the wall-clock gap since the previous sample (used to decay both
    /// windows); pass `Duration::ZERO` for the first sample.
    pub fn record(&mut self, duration: Duration, elapsed_since_last: Duration) {
        let secs = duration.as_secs_f64();
        self.short.record(secs, elapsed_since_last);
        self.long.record(secs, elapsed_since_last);
    }

    /// The short-window (10 min half-life) estimate, or `None` if no sample
    /// has been recorded yet.
    pub fn short_estimate(&self) -> Option<Duration> {
        self.short.value.map(Duration::from_secs_f64)
    }

    /// The long-window (1 h half-life) estimate.
    pub fn long_estimate(&self) -> Option<Duration> {
        self.long.value.map(Duration::from_secs_f64)
    }
}

impl Default for DualEma {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "ema_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Limiter (C11, spec.md §4.11): polls the metrics counters and enforces
//! the fleet's global termination conditions — a maximum completed-task
//! count, or a maximum idle duration once no work is running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use qrunner_core::Clock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::metrics::Metrics;
use crate::servers::OpenForBusiness;

/// The floor spec.md's Open Questions resolve `limitInterval` to: values
/// below this are clamped, with a startup warning rather than a silent
/// failure.
pub const MINIMUM_LIMIT_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Duplicate-warning suppression window (spec.md §4.11).
const DUPLICATE_WARNING_WINDOW: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy)]
pub struct LimiterConfig {
    pub max_tasks: Option<u64>,
    pub max_idle: Option<Duration>,
    pub limit_interval: Duration,
}

impl LimiterConfig {
    /// Clamps `limit_interval` to the 5-minute floor, returning whether a
    /// clamp occurred so the caller can log a startup warning (spec.md's
    /// Open Question resolution).
    pub fn clamped(mut self) -> (Self, bool) {
        if self.limit_interval < MINIMUM_LIMIT_INTERVAL {
            self.limit_interval = MINIMUM_LIMIT_INTERVAL;
            (self, true)
        } else {
            (self, false)
        }
    }
}

/// Process-wide flag the Servers Registry consults so `Cycle` becomes a
/// no-op once the task ceiling is reached but work is still draining
/// (spec.md §4.11's "no new tasks" flag).
#[derive(Clone, Default)]
pub struct NoNewTasksFlag(Arc<AtomicBool>);

impl NoNewTasksFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Polls this flag and, once tripped, freezes every given
    /// `ServersRegistry` (across however many backends are configured) so
    /// their `cycle()` stops admitting new servers/queues while in-flight
    /// work drains (spec.md §4.11: "allow current work to drain"). Exits
    /// after applying the freeze once, or immediately if `cancel` fires
    /// first.
    pub async fn run_propagator(self, registries: Vec<Arc<dyn OpenForBusiness>>, cancel: CancellationToken) {
        loop {
            if self.is_set() {
                for registry in &registries {
                    registry.set_open_for_business(false);
                }
                info!("no-new-tasks flag tripped, servers registries frozen for drain");
                return;
            }
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                _ = cancel.cancelled() => return,
            }
        }
    }
}

pub struct Limiter<C: Clock> {
    clock: C,
    config: LimiterConfig,
    metrics: Arc<Metrics>,
    no_new_tasks: NoNewTasksFlag,
    last_nonzero_running: std::sync::Mutex<std::time::Instant>,
    last_duplicate_warning: std::sync::Mutex<Option<std::time::Instant>>,
}

impl<C: Clock> Limiter<C> {
    pub fn new(clock: C, config: LimiterConfig, metrics: Arc<Metrics>, no_new_tasks: NoNewTasksFlag) -> Self {
        let now = clock.now();
        Self {
            clock,
            config,
            metrics,
            no_new_tasks,
            last_nonzero_running: std::sync::Mutex::new(now),
            last_duplicate_warning: std::sync::Mutex::new(None),
        }
    }

    fn warn_once(&self, message: &str) {
        let now = self.clock.now();
        let mut last = self.last_duplicate_warning.lock().unwrap_or_else(|e| e.into_inner());
        if last.map(|t| now.saturating_duration_since(t) < DUPLICATE_WARNING_WINDOW).unwrap_or(false) {
            return;
        }
        *last = Some(now);
        warn!("{message}");
    }

    /// One polling tick (spec.md §4.11's conditions). Returns `true` if
    /// the root context should be cancelled.
    fn tick(&self) -> bool {
        let running = self.metrics.tasks_running.get();
        let completed = self.metrics.tasks_completed.get();

        if running > 0 {
            *self.last_nonzero_running.lock().unwrap_or_else(|e| e.into_inner()) = self.clock.now();
        }

        if let Some(max_tasks) = self.config.max_tasks {
            let total = running.max(0) as u64 + completed;
            if total >= max_tasks {
                if running == 0 {
                    self.warn_once("max tasks reached and no task running, shutting down");
                    return true;
                }
                self.no_new_tasks.set();
            }
        }

        if let Some(max_idle) = self.config.max_idle {
            if running == 0 {
                let idle_for = self
                    .clock
                    .now()
                    .saturating_duration_since(*self.last_nonzero_running.lock().unwrap_or_else(|e| e.into_inner()));
                if idle_for > max_idle {
                    self.warn_once("max idle duration reached, shutting down");
                    return true;
                }
            }
        }

        false
    }

    /// Runs the poll loop until either a termination condition fires (in
    /// which case `root` is cancelled) or `root` is cancelled externally.
    pub async fn run(self: Arc<Self>, root: CancellationToken) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.limit_interval) => {
                    if self.tick() {
                        root.cancel();
                        return;
                    }
                }
                _ = root.cancelled() => return,
            }
        }
    }
}

#[cfg(test)]
#[path = "limiter_tests.rs"]
mod tests;

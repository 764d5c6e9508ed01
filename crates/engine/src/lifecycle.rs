// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle Broadcaster (C1, spec.md §4.1): fans the cluster-wide
//! Running/DrainAndSuspend/Unknown signal out to any number of
//! subscribers, tolerating slow or dead sinks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use qrunner_core::LifecycleState;
use rand::Rng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const SINK_TIMEOUT: Duration = Duration::from_millis(500);
const REPUBLISH_INTERVAL: Duration = Duration::from_secs(180);
const REPUBLISH_JITTER_SECS: u64 = 15;

struct Inner {
    sinks: HashMap<u64, mpsc::Sender<LifecycleState>>,
    current: LifecycleState,
}

/// Process-wide, created once at startup (spec.md §3's "Lifecycles").
pub struct LifecycleBroadcaster {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl Default for LifecycleBroadcaster {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                sinks: HashMap::new(),
                current: LifecycleState::default(),
            }),
            next_id: AtomicU64::new(1),
        }
    }
}

impl LifecycleBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new sink, returning an id usable with `delete`. The
    /// sink does not receive the current state immediately — callers that
    /// need it should call `current()` right after `add`.
    pub fn add(&self, sink: mpsc::Sender<LifecycleState>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.lock().sinks.insert(id, sink);
        id
    }

    /// Idempotent: deleting an id twice, or one never registered, is a
    /// silent no-op.
    pub fn delete(&self, id: u64) {
        self.inner.lock().sinks.remove(&id);
    }

    pub fn current(&self) -> LifecycleState {
        self.inner.lock().current
    }

    /// Publishes `state` to every sink, under a 500ms per-sink timeout.
    /// A sink that times out, closes, or panics mid-send is logged and
    /// skipped — publishing never blocks on, or is poisoned by, one bad
    /// subscriber.
    pub async fn publish(&self, state: LifecycleState) {
        let sinks: Vec<(u64, mpsc::Sender<LifecycleState>)> = {
            let mut inner = self.inner.lock();
            inner.current = state;
            inner.sinks.iter().map(|(id, s)| (*id, s.clone())).collect()
        };

        let sends = sinks.into_iter().map(|(id, sink)| async move {
            let task = tokio::spawn(async move { sink.send(state).await });
            match tokio::time::timeout(SINK_TIMEOUT, task).await {
                Ok(Ok(Ok(()))) => debug!(sink = id, "lifecycle update delivered"),
                Ok(Ok(Err(_))) => debug!(sink = id, "lifecycle sink closed"),
                Ok(Err(join_err)) => {
                    warn!(sink = id, panicked = join_err.is_panic(), "lifecycle sink task failed")
                }
                Err(_elapsed) => warn!(sink = id, "lifecycle sink timed out, update dropped"),
            }
        });
        futures::future::join_all(sends).await;
    }

    /// Runs the periodic re-publish loop (spec.md §4.1's "newly attached
    /// sinks converge"), exiting when `cancel` fires.
    pub async fn run_repeater(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let jitter_secs: i64 = rand::thread_rng()
                .gen_range(-(REPUBLISH_JITTER_SECS as i64)..=(REPUBLISH_JITTER_SECS as i64));
            let wait = if jitter_secs >= 0 {
                REPUBLISH_INTERVAL + Duration::from_secs(jitter_secs as u64)
            } else {
                REPUBLISH_INTERVAL.saturating_sub(Duration::from_secs((-jitter_secs) as u64))
            };
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    let state = self.current();
                    self.publish(state).await;
                }
                _ = cancel.cancelled() => return,
            }
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backoff Registry (C2, spec.md §4.2): a TTL-keyed set used ubiquitously
//! to stagger the next visit to a queue after a check or a message
//! completes, succeeds, or fails.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use qrunner_core::Clock;

const PURGE_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Typical TTLs named in spec.md §4.2, kept here so callers don't
/// hand-roll magic durations at call sites.
pub mod ttl {
    use std::time::Duration;

    pub const AFTER_SUCCESS: Duration = Duration::from_secs(1);
    pub const AFTER_HARD_ERROR: Duration = Duration::from_secs(10);
    pub const MAX: Duration = Duration::from_secs(3 * 60);

    /// Doubles `previous` (starting from `AFTER_HARD_ERROR` on first
    /// failure), capped at `MAX`.
    pub fn next_failure_ttl(previous: Option<Duration>) -> Duration {
        previous
            .map(|p| (p * 2).min(MAX))
            .unwrap_or(AFTER_HARD_ERROR)
            .min(MAX)
    }
}

struct Entry {
    expires_at_instant: std::time::Instant,
}

/// Process-wide, set-like registry of `fully-qualified queue name ->
/// expiry`. Entries are purged lazily on `get`/`set` and by a periodic
/// sweep; there is no background task required for correctness, only for
/// bounding memory between sweeps.
pub struct BackoffRegistry<C: Clock> {
    clock: C,
    entries: Mutex<HashMap<String, Entry>>,
}

impl<C: Clock> BackoffRegistry<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Suppresses `key` from reselection for `ttl`. A repeated `set`
    /// simply overwrites the prior expiry — the registry holds at most one
    /// entry per key.
    pub fn set(&self, key: impl Into<String>, ttl: Duration) {
        let expires_at_instant = self.clock.now() + ttl;
        self.entries
            .lock()
            .insert(key.into(), Entry { expires_at_instant });
    }

    /// Returns `true` iff an unexpired entry exists for `key`. An expired
    /// entry is removed as a side effect, so repeated `get` calls on a
    /// long-expired key don't keep scanning dead weight.
    pub fn get(&self, key: &str) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at_instant > self.clock.now() => true,
            Some(_) => {
                entries.remove(key);
                false
            }
            None => false,
        }
    }

    /// Drops every expired entry. Called by the periodic sweep; safe to
    /// call more or less often than `PURGE_SWEEP_INTERVAL` (it's just a
    /// memory-bounding pass, not a correctness requirement).
    pub fn purge_expired(&self) {
        let now = self.clock.now();
        self.entries.lock().retain(|_, e| e.expires_at_instant > now);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs the periodic purge sweep (spec.md §4.2's "~10s") until
    /// cancelled.
    pub async fn run_purge_loop(self: std::sync::Arc<Self>, cancel: tokio_util::sync::CancellationToken)
    where
        C: 'static,
    {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(PURGE_SWEEP_INTERVAL) => self.purge_expired(),
                _ = cancel.cancelled() => return,
            }
        }
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;

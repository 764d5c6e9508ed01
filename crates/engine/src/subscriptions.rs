// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscription Table (C5, spec.md §4.5): a Queuer's exclusive record of
//! every queue it currently believes exists on its server, along with
//! each queue's last-observed resource spec, in-flight worker count, and
//! execution-time EMA.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use parking_lot::Mutex;
use qrunner_core::{Clock, DualEma, QueueName, ResourceEnvelope, SubscriptionSnapshot};
use tracing::{debug, info};

use crate::error::EngineError;

struct Entry {
    snapshot: SubscriptionSnapshot,
    ema: DualEma,
    last_sample_at: Option<Instant>,
}

impl Entry {
    fn fresh(queue: QueueName) -> Self {
        Self {
            snapshot: SubscriptionSnapshot::new(queue),
            ema: DualEma::new(),
            last_sample_at: None,
        }
    }
}

/// Owned exclusively by one Queuer (spec.md §3's "Subscriptions are owned
/// by their Queuer"). Not `Clone` — a `Queuer` holds this behind an `Arc`
/// if it needs to share read access with its own sub-tasks.
pub struct SubscriptionTable<C: Clock> {
    clock: C,
    entries: Mutex<HashMap<QueueName, Entry>>,
}

/// Result of reconciling a freshly-discovered queue set against the
/// table (spec.md §4.5).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignDelta {
    pub added: Vec<QueueName>,
    pub removed: Vec<QueueName>,
}

impl<C: Clock> SubscriptionTable<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Reconciles `seen` (this Queuer's latest `Refresh` result) against
    /// the stored map: queues missing from the table are added with a
    /// fresh EMA, queues in the table but absent from `seen` are dropped.
    /// A second `align` call with the same set is a no-op (idempotence
    /// law, spec.md §8).
    pub fn align(&self, seen: &HashSet<QueueName>) -> AlignDelta {
        let mut entries = self.entries.lock();
        let mut delta = AlignDelta::default();

        for queue in seen {
            if !entries.contains_key(queue) {
                entries.insert(queue.clone(), Entry::fresh(queue.clone()));
                delta.added.push(queue.clone());
            }
        }

        let stale: Vec<QueueName> = entries
            .keys()
            .filter(|q| !seen.contains(*q))
            .cloned()
            .collect();
        for queue in &stale {
            entries.remove(queue);
            delta.removed.push(queue.clone());
        }

        if !delta.added.is_empty() || !delta.removed.is_empty() {
            info!(added = delta.added.len(), removed = delta.removed.len(), "subscription table aligned");
        }
        delta
    }

    pub fn set_resources(&self, queue: &QueueName, envelope: ResourceEnvelope) -> Result<(), EngineError> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(queue)
            .ok_or_else(|| EngineError::QueueNotPresent(queue.to_string()))?;
        entry.snapshot.last_resources = Some(envelope);
        Ok(())
    }

    pub fn inc_workers(&self, queue: &QueueName) -> Result<(), EngineError> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(queue)
            .ok_or_else(|| EngineError::QueueNotPresent(queue.to_string()))?;
        entry.snapshot.in_flight += 1;
        Ok(())
    }

    pub fn dec_workers(&self, queue: &QueueName) -> Result<(), EngineError> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(queue)
            .ok_or_else(|| EngineError::QueueNotPresent(queue.to_string()))?;
        entry.snapshot.in_flight = entry.snapshot.in_flight.saturating_sub(1);
        Ok(())
    }

    pub fn record_exec_time(&self, queue: &QueueName, duration: std::time::Duration) -> Result<(), EngineError> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(queue)
            .ok_or_else(|| EngineError::QueueNotPresent(queue.to_string()))?;
        let now = self.clock.now();
        let elapsed = entry
            .last_sample_at
            .map(|prev| now.saturating_duration_since(prev))
            .unwrap_or_default();
        entry.ema.record(duration, elapsed);
        entry.last_sample_at = Some(now);
        entry.snapshot.exec_time_short = entry.ema.short_estimate();
        entry.snapshot.exec_time_long = entry.ema.long_estimate();
        debug!(queue = %queue, ?duration, "recorded execution time sample");
        Ok(())
    }

    pub fn get_exec_ema(&self, queue: &QueueName) -> Result<(Option<std::time::Duration>, Option<std::time::Duration>), EngineError> {
        let entries = self.entries.lock();
        let entry = entries
            .get(queue)
            .ok_or_else(|| EngineError::QueueNotPresent(queue.to_string()))?;
        Ok((entry.ema.short_estimate(), entry.ema.long_estimate()))
    }

    pub fn snapshot(&self, queue: &QueueName) -> Option<SubscriptionSnapshot> {
        self.entries.lock().get(queue).map(|e| e.snapshot.clone())
    }

    /// All known queues' snapshots, in no particular order. Used by the
    /// Queuer's producer loop to build its ranked candidate list.
    pub fn all(&self) -> Vec<SubscriptionSnapshot> {
        self.entries.lock().values().map(|e| e.snapshot.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "subscriptions_tests.rs"]
mod tests;

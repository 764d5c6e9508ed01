// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Busy Registry (C3, spec.md §4.3): a lock-protected set of (server,
//! queue) pairs currently being serviced, enforcing at-most-one worker
//! per queue.

use std::collections::HashSet;

use parking_lot::Mutex;

/// Process-wide. Keys are the `server/queue` fully-qualified name
/// (`QueueDescriptor::fq_name`) rather than a tuple, so the registry has
/// no dependency on the server/queue types themselves.
#[derive(Default)]
pub struct BusyRegistry {
    busy: Mutex<HashSet<String>>,
}

impl BusyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `key` iff absent. Returns `true` on success (caller now
    /// owns the slot and must eventually call `release`), `false` if
    /// already held.
    pub fn try_acquire(&self, key: impl Into<String>) -> bool {
        self.busy.lock().insert(key.into())
    }

    /// Idempotent: releasing a key not currently held (or released twice)
    /// is a silent no-op.
    pub fn release(&self, key: &str) {
        self.busy.lock().remove(key);
    }

    pub fn is_busy(&self, key: &str) -> bool {
        self.busy.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.busy.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// RAII guard that releases its Busy entry on drop, so a panicking or
/// early-returning worker can never leak a held slot.
pub struct BusyGuard<'a> {
    registry: &'a BusyRegistry,
    key: String,
}

impl BusyRegistry {
    /// Acquires `key` and returns a guard that releases it on drop, or
    /// `None` if already held.
    pub fn try_acquire_guard(&self, key: impl Into<String>) -> Option<BusyGuard<'_>> {
        let key = key.into();
        if self.try_acquire(key.clone()) {
            Some(BusyGuard {
                registry: self,
                key,
            })
        } else {
            None
        }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.registry.release(&self.key);
    }
}

#[cfg(test)]
#[path = "busy_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource Ledger (C4, spec.md §4.4): tracks free CPU, RAM, disk, and GPU
//! slots/memory, admitting or rejecting requests atomically under a single
//! mutex that is never held across `.await`.

use parking_lot::Mutex;
use qrunner_core::ResourceEnvelope;

use crate::error::EngineError;

/// One GPU card known to the ledger at startup (spec.md §4.4). Cards with
/// `ecc_failed` set are excluded from every allocation, including
/// dry-runs, as if they didn't exist.
#[derive(Debug, Clone)]
pub struct GpuCard {
    pub id: String,
    pub total_slots: u32,
    pub free_slots: u32,
    pub mem_bytes_per_slot: u64,
    pub ecc_failed: bool,
}

impl GpuCard {
    pub fn new(id: impl Into<String>, total_slots: u32, mem_bytes_per_slot: u64) -> Self {
        Self {
            id: id.into(),
            total_slots,
            free_slots: total_slots,
            mem_bytes_per_slot,
            ecc_failed: false,
        }
    }

    fn usable(&self) -> bool {
        !self.ecc_failed
    }
}

/// One card's contribution to a granted GPU allocation.
#[derive(Debug, Clone)]
pub struct GpuGrant {
    pub card_id: String,
    pub slots: u32,
}

/// A granted resource allocation, returned by `Alloc(live=true)`. Holding
/// this value is the caller's proof of ownership; it must eventually be
/// passed to `Release`.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub cpu: u32,
    pub ram_bytes: u64,
    pub disk_bytes: u64,
    pub gpu: Vec<GpuGrant>,
}

struct Inner {
    cpu_free: u32,
    ram_free: u64,
    disk_free: u64,
    gpu_cards: Vec<GpuCard>,
}

/// Shared, mutex-serialized ledger (spec.md §5: "the only shared mutable
/// ledger").
pub struct ResourceLedger {
    inner: Mutex<Inner>,
}

impl ResourceLedger {
    pub fn new(cpu: u32, ram_bytes: u64, disk_bytes: u64, gpu_cards: Vec<GpuCard>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                cpu_free: cpu,
                ram_free: ram_bytes,
                disk_free: disk_bytes,
                gpu_cards,
            }),
        }
    }

    /// Tests (or, with `live=true`, performs) an allocation of `request`.
    /// `live=false` is a pure feasibility test: the ledger is left
    /// untouched either way. Errors name the first starved dimension
    /// encountered (spec.md §4.4's "structured errors naming the starved
    /// dimension").
    pub fn alloc(&self, request: &ResourceEnvelope, live: bool) -> Result<Allocation, EngineError> {
        let mut inner = self.inner.lock();

        if request.cpu > inner.cpu_free {
            return Err(EngineError::ResourceExhausted {
                dimension: "cpu",
                requested: request.cpu as u64,
                free: inner.cpu_free as u64,
            });
        }
        if request.ram_bytes > inner.ram_free {
            return Err(EngineError::ResourceExhausted {
                dimension: "ram",
                requested: request.ram_bytes,
                free: inner.ram_free,
            });
        }
        if request.disk_bytes > inner.disk_free {
            return Err(EngineError::ResourceExhausted {
                dimension: "disk",
                requested: request.disk_bytes,
                free: inner.disk_free,
            });
        }

        let gpu = if request.gpu.slots > 0 {
            Self::plan_gpu(&inner.gpu_cards, &request.gpu)?
        } else {
            Vec::new()
        };

        if live {
            inner.cpu_free -= request.cpu;
            inner.ram_free -= request.ram_bytes;
            inner.disk_free -= request.disk_bytes;
            for grant in &gpu {
                if let Some(card) = inner.gpu_cards.iter_mut().find(|c| c.id == grant.card_id) {
                    card.free_slots -= grant.slots;
                }
            }
        }

        Ok(Allocation {
            cpu: request.cpu,
            ram_bytes: request.ram_bytes,
            disk_bytes: request.disk_bytes,
            gpu,
        })
    }

    /// Plans a GPU allocation without mutating ledger state: either a
    /// specific slot count on any single usable card, or a total slot
    /// count distributed across N cards, preferring cards with the fewest
    /// free slots first (tightest fit packs other cards' free space for
    /// larger future requests).
    fn plan_gpu(
        cards: &[GpuCard],
        request: &qrunner_core::GpuRequest,
    ) -> Result<Vec<GpuGrant>, EngineError> {
        let mut candidates: Vec<&GpuCard> = cards
            .iter()
            .filter(|c| c.usable() && c.mem_bytes_per_slot >= request.mem_bytes_per_slot)
            .collect();
        candidates.sort_by_key(|c| c.free_slots);

        if !request.distributable {
            return candidates
                .into_iter()
                .find(|c| c.free_slots >= request.slots)
                .map(|c| {
                    vec![GpuGrant {
                        card_id: c.id.clone(),
                        slots: request.slots,
                    }]
                })
                .ok_or(EngineError::GpuUnsatisfiable(request.slots));
        }

        let mut remaining = request.slots;
        let mut grants = Vec::new();
        for card in candidates {
            if remaining == 0 {
                break;
            }
            let take = card.free_slots.min(remaining);
            if take == 0 {
                continue;
            }
            grants.push(GpuGrant {
                card_id: card.id.clone(),
                slots: take,
            });
            remaining -= take;
        }
        if remaining > 0 {
            return Err(EngineError::GpuUnsatisfiable(request.slots));
        }
        Ok(grants)
    }

    /// Returns `alloc` to the ledger. Infallible: a card removed since the
    /// allocation was granted (hot-removal) is reported as a warning
    /// rather than an error, since the other dimensions must still be
    /// returned.
    pub fn release(&self, alloc: &Allocation) -> Vec<String> {
        let mut inner = self.inner.lock();
        inner.cpu_free += alloc.cpu;
        inner.ram_free += alloc.ram_bytes;
        inner.disk_free += alloc.disk_bytes;

        let mut warnings = Vec::new();
        for grant in &alloc.gpu {
            match inner.gpu_cards.iter_mut().find(|c| c.id == grant.card_id) {
                Some(card) => {
                    card.free_slots = (card.free_slots + grant.slots).min(card.total_slots);
                }
                None => warnings.push(format!(
                    "released allocation referenced card {} which is no longer present",
                    grant.card_id
                )),
            }
        }
        warnings
    }

    /// Current free envelope. GPU fields report the sum of free slots
    /// across usable cards and the minimum per-slot memory among them (a
    /// conservative figure for "what a single request could get").
    pub fn snapshot(&self) -> ResourceEnvelope {
        let inner = self.inner.lock();
        let usable: Vec<&GpuCard> = inner.gpu_cards.iter().filter(|c| c.usable()).collect();
        let gpu_slots: u32 = usable.iter().map(|c| c.free_slots).sum();
        let gpu_mem = usable.iter().map(|c| c.mem_bytes_per_slot).min().unwrap_or(0);
        ResourceEnvelope {
            cpu: inner.cpu_free,
            ram_bytes: inner.ram_free,
            disk_bytes: inner.disk_free,
            gpu: qrunner_core::GpuRequest {
                slots: gpu_slots,
                mem_bytes_per_slot: gpu_mem,
                distributable: true,
            },
        }
    }
}

#[cfg(test)]
#[path = "ledger_tests.rs"]
mod tests;

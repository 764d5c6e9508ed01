// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource envelopes (spec.md §3) and the human-readable byte parser used
//! once on CLI entry.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A fully-populated resource request or allocation. Fields absent from the
/// source (CLI flag, queue-observed spec) default to zero — never `None` —
/// so downstream arithmetic never has to branch on missingness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceEnvelope {
    pub cpu: u32,
    pub ram_bytes: u64,
    pub disk_bytes: u64,
    pub gpu: GpuRequest,
}

/// GPU allocation request (spec.md §4.4): either a slot count on any single
/// card, or a total slot count distributable across N cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GpuRequest {
    pub slots: u32,
    pub mem_bytes_per_slot: u64,
    pub distributable: bool,
}

impl ResourceEnvelope {
    pub fn cpu_only(cpu: u32) -> Self {
        Self {
            cpu,
            ..Self::default()
        }
    }

    /// Whether every dimension of `self` fits within `other` (used for the
    /// ledger's feasibility test and for snapshot comparisons).
    pub fn fits_within(&self, other: &ResourceEnvelope) -> bool {
        self.cpu <= other.cpu
            && self.ram_bytes <= other.ram_bytes
            && self.disk_bytes <= other.disk_bytes
            && self.gpu.slots <= other.gpu.slots
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ByteSizeError {
    #[error("empty byte-size string")]
    Empty,
    #[error("invalid number in byte-size string: {0}")]
    InvalidNumber(String),
    #[error("unknown byte-size unit: {0}")]
    UnknownUnit(String),
}

/// Parse a human-readable byte size such as `"512MiB"`, `"4GB"`, `"100"`
/// (bytes) into a `u64` count of bytes. Binary (`Ki`/`Mi`/`Gi`/`Ti`) and
/// decimal (`k`/`M`/`G`/`T`) units are both accepted, matching the
/// conventions of CLI flags that take a byte size.
pub fn parse_bytes(s: &str) -> Result<u64, ByteSizeError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ByteSizeError::Empty);
    }

    let split_at = s
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    let (num_str, unit) = s.split_at(split_at);
    let num: f64 = num_str
        .parse()
        .map_err(|_| ByteSizeError::InvalidNumber(num_str.to_string()))?;

    let multiplier: f64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1.0,
        "kb" | "k" => 1_000.0,
        "mb" | "m" => 1_000_000.0,
        "gb" | "g" => 1_000_000_000.0,
        "tb" | "t" => 1_000_000_000_000.0,
        "kib" => 1024.0,
        "mib" => 1024.0_f64.powi(2),
        "gib" => 1024.0_f64.powi(3),
        "tib" => 1024.0_f64.powi(4),
        other => return Err(ByteSizeError::UnknownUnit(other.to_string())),
    };

    Ok((num * multiplier).round() as u64)
}

#[cfg(test)]
#[path = "resource_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster-wide lifecycle state (spec.md §3, §4.1).

use serde::{Deserialize, Serialize};

/// The fleet-wide drain/suspend signal broadcast by the Lifecycle
/// Broadcaster (C1) and consumed by every Backend Service (C9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LifecycleState {
    /// No authoritative signal has been observed yet.
    #[default]
    Unknown,
    /// The fleet is healthy; backend services discover and dispatch work.
    Running,
    /// No new work should be dequeued; in-flight work continues to drain.
    DrainAndSuspend,
}

impl LifecycleState {
    /// Parse the literal `STATE` value from the cluster config map
    /// (spec.md §6). Unrecognized values are rejected rather than silently
    /// mapped to `Unknown`, since a typo'd config map key should surface as
    /// a startup/watch error, not a silent no-op.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Running" => Some(Self::Running),
            "DrainAndSuspend" => Some(Self::DrainAndSuspend),
            "Unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Whether a backend service that treats `Unknown` as dispatch-eligible
    /// (SQS, file) should proceed this pass.
    pub fn permits_cloud_dispatch(self) -> bool {
        matches!(self, Self::Running | Self::Unknown)
    }

    /// Whether a backend service that requires an authoritative `Running`
    /// signal (AMQP) should proceed this pass.
    pub fn permits_strict_dispatch(self) -> bool {
        matches!(self, Self::Running)
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;

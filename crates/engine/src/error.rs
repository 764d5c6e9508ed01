// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types shared across the engine's components.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("queue {0} is not present in the subscription table")]
    QueueNotPresent(String),
    #[error("resource exhausted: insufficient {dimension} (requested {requested}, free {free})")]
    ResourceExhausted {
        dimension: &'static str,
        requested: u64,
        free: u64,
    },
    #[error("no GPU card has {0} free slots and none are distributable")]
    GpuUnsatisfiable(u32),
    #[error("allocation references a card that is no longer present: {0}")]
    UnknownCard(String),
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error kinds shared across crates (spec.md §7), carrying the contextual
//! key/value trail (queue, project, experiment) that `tracing` expects as
//! structured fields rather than a flat string.

use thiserror::Error;

/// The ack/nack/dump decision spec.md §7 assigns to each error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Acknowledge and remove from the queue.
    Ack,
    /// Negative-acknowledge; the broker will redeliver.
    Nack,
}

/// Errors classified by spec.md §7's taxonomy. Each variant names the
/// queue/project context inline rather than bundling a string.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("transient queue error on {project}/{queue}: {source}")]
    TransientQueue {
        project: String,
        queue: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("permanent queue error on {project}/{queue}: queue no longer exists")]
    PermanentQueue { project: String, queue: String },
    #[error("resource exhaustion on {project}/{queue}: insufficient {dimension}")]
    ResourceExhausted {
        project: String,
        queue: String,
        dimension: String,
    },
    #[error("payload validation failed for experiment {experiment}: {reason}")]
    PayloadValidation { experiment: String, reason: String },
}

impl CoreError {
    /// The disposition spec.md §7 assigns to this error kind when it
    /// surfaces from the Message Handler.
    pub fn disposition(&self) -> Disposition {
        match self {
            CoreError::TransientQueue { .. } | CoreError::ResourceExhausted { .. } => {
                Disposition::Nack
            }
            CoreError::PermanentQueue { .. } | CoreError::PayloadValidation { .. } => {
                Disposition::Ack
            }
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

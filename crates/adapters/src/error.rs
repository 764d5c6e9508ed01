// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors surfaced by a `QueueAdapter` (spec.md §4.6, §7).

use thiserror::Error;

/// Failures an adapter can report back to the Queuer. The distinction
/// between `Transient` and `Permanent` drives the Backoff Registry: a
/// permanent failure (queue deleted) should not be retried on the usual
/// backoff schedule, a transient one (broker unreachable) should.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("transient failure talking to {server}/{queue}: {source}")]
    Transient {
        server: String,
        queue: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("queue {server}/{queue} no longer exists")]
    Permanent { server: String, queue: String },
    #[error("malformed credential handle for {server}: {reason}")]
    BadCredential { server: String, reason: String },
    #[error("encryption failure: {0}")]
    Crypto(String),
}

impl AdapterError {
    pub fn transient(
        server: impl Into<String>,
        queue: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transient {
            server: server.into(),
            queue: queue.into(),
            source: Box::new(source),
        }
    }
}

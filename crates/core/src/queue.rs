// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue descriptor (spec.md §3): the triple a `QueueAdapter::Refresh` call
//! reports for each discovered queue.

use crate::ids::{CredentialHandle, QueueName, ServerId};

/// A queue discovered on a server, with the credential handle needed to
/// operate on it. Opaque to the engine beyond identity and equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDescriptor {
    pub server: ServerId,
    pub queue: QueueName,
    pub credential: CredentialHandle,
}

impl QueueDescriptor {
    pub fn new(server: ServerId, queue: QueueName, credential: CredentialHandle) -> Self {
        Self {
            server,
            queue,
            credential,
        }
    }

    /// The `server/queue` key used to index the Busy and Backoff
    /// registries.
    pub fn fq_name(&self) -> String {
        self.server.scoped(&self.queue)
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;

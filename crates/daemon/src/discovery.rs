// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `ServerDiscovery` implementations wiring the daemon's CLI flags to the
//! Backend Service driver (spec.md §4.9).
//!
//! AMQP has exactly one server per process: the configured broker URL.
//! SQS and file queues are different in this codebase than a literal
//! reading of "one server per region / one server per subdirectory"
//! would suggest — `qrunner_adapters::SqsAdapter` already scans every
//! region under its credentials root and caches one client per region
//! internally, and `qrunner_adapters::FileAdapter` already treats every
//! immediate child of its root as a queue. Reporting one logical
//! `ServerId` per backend here, rather than one per region or
//! subdirectory, matches what the adapter instance actually owns: a
//! single `SqsAdapter`/`FileAdapter` is the unit of work, and per-queue
//! exclusivity is still enforced downstream by the Busy and Backoff
//! registries keyed on `server.scoped(&queue)`.

use std::path::PathBuf;

use async_trait::async_trait;
use qrunner_adapters::credentials;
use qrunner_core::ServerId;
use qrunner_engine::{DiscoveryError, ServerDiscovery};

/// Single configured AMQP broker. Discovery never fails: the server
/// identity is fixed at startup, independent of broker reachability
/// (connection failures surface as queue-level transient errors inside
/// the Queuer instead).
pub struct AmqpDiscovery {
    server: ServerId,
}

impl AmqpDiscovery {
    pub fn new(amqp_url: &str) -> Self {
        Self {
            server: ServerId::new(amqp_url.to_string()),
        }
    }
}

#[async_trait]
impl ServerDiscovery for AmqpDiscovery {
    async fn discover(&self) -> Result<Vec<ServerId>, DiscoveryError> {
        Ok(vec![self.server.clone()])
    }
}

/// Single logical server wrapping the whole SQS credentials root. Each
/// pass re-validates that the root still scans cleanly, surfacing a
/// misconfigured credentials directory as a discovery failure rather
/// than silently reporting zero servers.
pub struct SqsDiscovery {
    server: ServerId,
    credentials_root: PathBuf,
}

impl SqsDiscovery {
    pub fn new(credentials_root: impl Into<PathBuf>) -> Self {
        let credentials_root = credentials_root.into();
        Self {
            server: ServerId::new(format!("sqs:{}", credentials_root.display())),
            credentials_root,
        }
    }
}

#[async_trait]
impl ServerDiscovery for SqsDiscovery {
    async fn discover(&self) -> Result<Vec<ServerId>, DiscoveryError> {
        let root = self.credentials_root.clone();
        let regions = tokio::task::spawn_blocking(move || credentials::scan(&root))
            .await
            .map_err(|e| DiscoveryError(format!("credential scan task panicked: {e}")))?
            .map_err(|e| DiscoveryError(e.to_string()))?;
        if regions.is_empty() {
            return Err(DiscoveryError(format!(
                "no region credentials found under {}",
                self.credentials_root.display()
            )));
        }
        Ok(vec![self.server.clone()])
    }
}

/// Single logical server wrapping the whole file-queue root.
pub struct FileDiscovery {
    server: ServerId,
    queue_root: PathBuf,
}

impl FileDiscovery {
    pub fn new(queue_root: impl Into<PathBuf>) -> Self {
        let queue_root = queue_root.into();
        Self {
            server: ServerId::new(format!("file:{}", queue_root.display())),
            queue_root,
        }
    }
}

#[async_trait]
impl ServerDiscovery for FileDiscovery {
    async fn discover(&self) -> Result<Vec<ServerId>, DiscoveryError> {
        let root = self.queue_root.clone();
        let exists = tokio::task::spawn_blocking(move || root.is_dir())
            .await
            .map_err(|e| DiscoveryError(format!("queue root check task panicked: {e}")))?;
        if !exists {
            return Err(DiscoveryError(format!("queue root {} is not a directory", self.queue_root.display())));
        }
        Ok(vec![self.server.clone()])
    }
}

#[cfg(test)]
#[path = "discovery_tests.rs"]
mod tests;

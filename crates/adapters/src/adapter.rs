// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `QueueAdapter` trait (spec.md §4.6): the uniform interface AMQP,
//! SQS, and file-backed queues all satisfy.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use qrunner_core::{CoreError, CredentialHandle, Disposition, QueueName, ResourceEnvelope, QueueTask};
use regex::Regex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::AdapterError;

/// Outcome of one `QueueAdapter::work` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome {
    /// No message was available within the adapter's poll window.
    NoMessage,
    /// A message was dequeued, handed to the handler, and acked/nacked.
    Processed,
}

/// Result the Message Handler (C10, implemented in `qrunner-engine`) hands
/// back to the adapter once a dequeued message has been processed. The
/// adapter never parses the payload itself; it only needs to know whether
/// to ack or nack and what envelope was actually consumed.
#[derive(Debug, Clone)]
pub struct HandlerOutcome {
    pub disposition: Disposition,
    pub resource_observed: Option<ResourceEnvelope>,
}

impl HandlerOutcome {
    pub fn ack(resource_observed: Option<ResourceEnvelope>) -> Self {
        Self {
            disposition: Disposition::Ack,
            resource_observed,
        }
    }

    pub fn nack() -> Self {
        Self {
            disposition: Disposition::Nack,
            resource_observed: None,
        }
    }
}

/// Callback invoked by `QueueAdapter::work` once a message has been
/// dequeued. Defined here (rather than in `qrunner-engine`) so the adapter
/// crate has no dependency on the engine crate — the engine implements
/// this trait and the daemon wires the two together.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    async fn handle(&self, task: QueueTask, cancel: CancellationToken) -> HandlerOutcome;
}

/// Uniform interface over AMQP, SQS, and file-backed queues (spec.md §4.6).
#[async_trait]
pub trait QueueAdapter: Clone + Send + Sync + 'static {
    /// Lists queues matching `name_match` and not matching `name_mismatch`,
    /// returning the credential handle for each.
    async fn refresh(
        &self,
        name_match: &Regex,
        name_mismatch: &Regex,
    ) -> Result<HashMap<QueueName, CredentialHandle>, AdapterError>;

    /// Dequeues at most one message for `queue`, heartbeating the broker
    /// for as long as `handler` takes to run, then acks or nacks per the
    /// handler's decision. Returns `NoMessage` if nothing was available
    /// within the adapter's poll window.
    async fn work(
        &self,
        queue: &QueueName,
        credential: &CredentialHandle,
        handler: &(dyn TaskHandler),
        cancel: CancellationToken,
    ) -> Result<WorkOutcome, AdapterError>;

    /// Whether the queue still exists on the broker/filesystem.
    async fn exists(&self, queue: &QueueName) -> Result<bool, AdapterError>;

    /// Cheap hint of whether the queue has pending work. AMQP and
    /// file-backed adapters answer truthfully; SQS always returns `true`
    /// since it has no cheap peek operation.
    async fn has_work(&self, queue: &QueueName) -> Result<bool, AdapterError>;

    /// Provisions an asynchronous egress channel for report messages.
    /// `public_key` is the queue's configured encryption key, if any —
    /// when present, messages sent on the returned channel are sealed
    /// before being published.
    async fn responder(
        &self,
        queue: &QueueName,
        public_key: Option<&[u8]>,
    ) -> Result<mpsc::Sender<qrunner_core::Report>, AdapterError>;

    /// Canonicalizes a queue's identifier for indexing and signature
    /// lookup.
    fn short_queue_name(&self, queue: &QueueName) -> String;

    fn refresh_interval(&self) -> Duration;

    fn work_check_interval(&self) -> Duration;
}

/// Converts an `AdapterError` into the engine-facing `CoreError` taxonomy,
/// used by the Message Handler when an adapter call itself fails (as
/// opposed to a failure inside the handler it invoked).
impl From<AdapterError> for CoreError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Transient {
                server,
                queue,
                source,
            } => CoreError::TransientQueue {
                project: server,
                queue,
                source,
            },
            AdapterError::Permanent { server, queue } => CoreError::PermanentQueue {
                project: server,
                queue,
            },
            AdapterError::BadCredential { server, reason } => CoreError::TransientQueue {
                project: server,
                queue: String::new(),
                source: Box::new(std::io::Error::other(reason)),
            },
            AdapterError::Crypto(reason) => CoreError::TransientQueue {
                project: String::new(),
                queue: String::new(),
                source: Box::new(std::io::Error::other(reason)),
            },
        }
    }
}

#[cfg(test)]
#[path = "adapter_tests.rs"]
mod tests;

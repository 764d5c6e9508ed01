// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake queue adapter for engine unit tests: records every call made
//! against it so tests can assert on adapter interaction order without
//! touching a real broker.
#![cfg_attr(coverage_nightly, coverage(off))]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use qrunner_core::{CredentialHandle, QueueName, QueueTask, Report};
use regex::Regex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::adapter::{QueueAdapter, TaskHandler, WorkOutcome};
use crate::error::AdapterError;

/// One recorded call against a `FakeQueueAdapter`, for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterCall {
    Refresh,
    Work { queue: QueueName },
    Exists { queue: QueueName },
    HasWork { queue: QueueName },
    Responder { queue: QueueName },
}

struct FakeState {
    calls: Vec<AdapterCall>,
    queues: HashMap<QueueName, CredentialHandle>,
    pending: HashMap<QueueName, VecDeque<QueueTask>>,
    exists: HashMap<QueueName, bool>,
    has_work: HashMap<QueueName, bool>,
    sent_reports: HashMap<QueueName, Vec<Report>>,
}

/// In-memory `QueueAdapter` used by engine tests. Queues, queued tasks,
/// and per-queue existence/has-work overrides are seeded by the test;
/// every call the engine makes against it is recorded for later
/// assertion.
#[derive(Clone)]
pub struct FakeQueueAdapter {
    inner: Arc<Mutex<FakeState>>,
    refresh_interval: Duration,
    work_check_interval: Duration,
}

impl Default for FakeQueueAdapter {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeState {
                calls: Vec::new(),
                queues: HashMap::new(),
                pending: HashMap::new(),
                exists: HashMap::new(),
                has_work: HashMap::new(),
                sent_reports: HashMap::new(),
            })),
            refresh_interval: Duration::from_millis(10),
            work_check_interval: Duration::from_millis(10),
        }
    }
}

impl FakeQueueAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<AdapterCall> {
        self.inner.lock().calls.clone()
    }

    /// Seeds a queue that `refresh` will report (subject to the caller's
    /// regex filters).
    pub fn seed_queue(&self, queue: QueueName, credential: CredentialHandle) {
        self.inner.lock().queues.insert(queue, credential);
    }

    /// Enqueues a task that the next `work` call against `queue` will
    /// dequeue.
    pub fn push_message(&self, queue: QueueName, task: QueueTask) {
        self.inner
            .lock()
            .pending
            .entry(queue)
            .or_default()
            .push_back(task);
    }

    pub fn set_exists(&self, queue: QueueName, exists: bool) {
        self.inner.lock().exists.insert(queue, exists);
    }

    pub fn set_has_work(&self, queue: QueueName, has_work: bool) {
        self.inner.lock().has_work.insert(queue, has_work);
    }

    /// Reports sent via `responder`'s returned channel, recorded for
    /// assertion. Requires the sender side to have been drained by the
    /// background relay spawned in `responder`.
    pub fn sent_reports(&self, queue: &QueueName) -> Vec<Report> {
        self.inner
            .lock()
            .sent_reports
            .get(queue)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl QueueAdapter for FakeQueueAdapter {
    async fn refresh(
        &self,
        name_match: &Regex,
        name_mismatch: &Regex,
    ) -> Result<HashMap<QueueName, CredentialHandle>, AdapterError> {
        let mut inner = self.inner.lock();
        inner.calls.push(AdapterCall::Refresh);
        Ok(inner
            .queues
            .iter()
            .filter(|(name, _)| {
                name_match.is_match(name.as_str()) && !name_mismatch.is_match(name.as_str())
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn work(
        &self,
        queue: &QueueName,
        _credential: &CredentialHandle,
        handler: &(dyn TaskHandler),
        cancel: CancellationToken,
    ) -> Result<WorkOutcome, AdapterError> {
        self.inner
            .lock()
            .calls
            .push(AdapterCall::Work { queue: queue.clone() });

        let task = self.inner.lock().pending.get_mut(queue).and_then(VecDeque::pop_front);
        let Some(task) = task else {
            return Ok(WorkOutcome::NoMessage);
        };
        let outcome = handler.handle(task, cancel).await;
        if let Some(resources) = outcome.resource_observed {
            // Recorded for inspection via the subscription table in real
            // adapters; the fake just drops it, tests assert on the
            // subscription table directly instead.
            let _ = resources;
        }
        Ok(WorkOutcome::Processed)
    }

    async fn exists(&self, queue: &QueueName) -> Result<bool, AdapterError> {
        let mut inner = self.inner.lock();
        inner.calls.push(AdapterCall::Exists { queue: queue.clone() });
        Ok(*inner.exists.get(queue).unwrap_or(&true))
    }

    async fn has_work(&self, queue: &QueueName) -> Result<bool, AdapterError> {
        let mut inner = self.inner.lock();
        inner.calls.push(AdapterCall::HasWork { queue: queue.clone() });
        if let Some(v) = inner.has_work.get(queue) {
            return Ok(*v);
        }
        Ok(inner.pending.get(queue).map(|q| !q.is_empty()).unwrap_or(false))
    }

    async fn responder(
        &self,
        queue: &QueueName,
        _public_key: Option<&[u8]>,
    ) -> Result<mpsc::Sender<Report>, AdapterError> {
        self.inner
            .lock()
            .calls
            .push(AdapterCall::Responder { queue: queue.clone() });

        let (tx, mut rx) = mpsc::channel::<Report>(32);
        let inner = self.inner.clone();
        let queue = queue.clone();
        tokio::spawn(async move {
            while let Some(report) = rx.recv().await {
                inner
                    .lock()
                    .sent_reports
                    .entry(queue.clone())
                    .or_default()
                    .push(report);
            }
        });
        Ok(tx)
    }

    fn short_queue_name(&self, queue: &QueueName) -> String {
        queue.as_str().to_string()
    }

    fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    fn work_check_interval(&self) -> Duration {
        self.work_check_interval
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend Services (C9, spec.md §4.9): the three independent long-running
//! drivers — AMQP, SQS, file — that wake on a timer, enumerate servers for
//! their backend, and hand the result to a Servers Registry. Identical
//! structure across backends is captured here as one generic driver;
//! what differs per backend is discovery (`ServerDiscovery`) and the
//! dispatch rule (spec.md's SQS/AMQP `Unknown` divergence, reproduced via
//! `DispatchRule`).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use qrunner_adapters::QueueAdapter;
use qrunner_core::{Clock, LifecycleState, ServerId};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::lifecycle::LifecycleBroadcaster;
use crate::metrics::{BackendLabels, Metrics, QueueType};
use crate::servers::ServersRegistry;

const DISCOVERY_DEADLINE: Duration = Duration::from_secs(15);
const FAILURE_CEILING: Duration = Duration::from_secs(3 * 60);

#[derive(Debug, Error)]
#[error("server discovery failed: {0}")]
pub struct DiscoveryError(pub String);

/// External collaborator: enumerates the servers a backend currently
/// knows about (AMQP: the single configured broker URL; SQS: scans a
/// credentials directory and lists regions; file: lists subdirectories of
/// the queue root).
#[async_trait]
pub trait ServerDiscovery: Send + Sync + 'static {
    async fn discover(&self) -> Result<Vec<ServerId>, DiscoveryError>;
}

/// Which lifecycle states permit a backend to dispatch this pass (spec.md
/// §4.9 and the Open Questions: SQS/file treat `Unknown` as dispatch
/// eligible; AMQP requires an authoritative `Running`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchRule {
    Strict,
    CloudTolerant,
}

impl DispatchRule {
    fn permits(self, state: LifecycleState) -> bool {
        match self {
            DispatchRule::Strict => state.permits_strict_dispatch(),
            DispatchRule::CloudTolerant => state.permits_cloud_dispatch(),
        }
    }
}

/// One backend driver. Owns exactly one `ServersRegistry` for its
/// backend.
pub struct BackendService<D: ServerDiscovery, A: QueueAdapter, C: Clock> {
    queue_type: QueueType,
    discovery: D,
    registry: Arc<ServersRegistry<A, C>>,
    lifecycle: Arc<LifecycleBroadcaster>,
    metrics: Arc<Metrics>,
    service_interval: Duration,
    dispatch_rule: DispatchRule,
    current_interval: AtomicU32,
}

impl<D: ServerDiscovery, A: QueueAdapter, C: Clock + 'static> BackendService<D, A, C> {
    pub fn new(
        queue_type: QueueType,
        discovery: D,
        registry: Arc<ServersRegistry<A, C>>,
        lifecycle: Arc<LifecycleBroadcaster>,
        metrics: Arc<Metrics>,
        service_interval: Duration,
        dispatch_rule: DispatchRule,
    ) -> Self {
        Self {
            queue_type,
            discovery,
            registry,
            lifecycle,
            metrics,
            service_interval,
            dispatch_rule,
            current_interval: AtomicU32::new(service_interval.as_millis() as u32),
        }
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(self.current_interval.load(Ordering::Relaxed) as u64)
    }

    fn reset_interval(&self) {
        self.current_interval
            .store(self.service_interval.as_millis() as u32, Ordering::Relaxed);
    }

    fn double_interval(&self) {
        let doubled = (self.interval() * 2).min(FAILURE_CEILING);
        self.current_interval.store(doubled.as_millis() as u32, Ordering::Relaxed);
    }

    /// Runs until `cancel` fires, then cancels every server this backend
    /// discovered (spec.md §4.9's "On Done, cancel all servers and
    /// return").
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let state = self.lifecycle.current();
            if !self.dispatch_rule.permits(state) {
                debug!(backend = ?self.queue_type, state = ?state, "service pass ignored: lifecycle state does not permit dispatch");
                self.metrics
                    .backend_ignored
                    .get_or_create(&BackendLabels { queue_type: self.queue_type })
                    .inc();
            } else {
                match tokio::time::timeout(DISCOVERY_DEADLINE, self.discovery.discover()).await {
                    Ok(Ok(servers)) => {
                        self.registry.cycle(&servers, &cancel);
                        self.reset_interval();
                    }
                    Ok(Err(err)) => {
                        warn!(backend = ?self.queue_type, error = %err, "server discovery pass failed");
                        self.metrics
                            .backend_discovery_failures
                            .get_or_create(&BackendLabels { queue_type: self.queue_type })
                            .inc();
                        self.double_interval();
                    }
                    Err(_elapsed) => {
                        warn!(backend = ?self.queue_type, "server discovery pass timed out");
                        self.metrics
                            .backend_discovery_failures
                            .get_or_create(&BackendLabels { queue_type: self.queue_type })
                            .inc();
                        self.double_interval();
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval()) => {}
                _ = cancel.cancelled() => break,
            }
        }
        self.registry.cancel_all();
    }
}

#[cfg(test)]
#[path = "backend_service_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide metrics (spec.md §4.9, §4.10, §4.11), exposed to the
//! daemon's `--prom-address` HTTP endpoint via `prometheus_client`.

use std::sync::Arc;

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

/// The three backend flavors a Backend Service (C9) drives.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum QueueType {
    Amqp,
    Sqs,
    File,
}

/// Labels for a single experiment-lifecycle tick (spec.md §4.10 step 2).
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ExperimentLabels {
    pub host: String,
    pub queue_type: QueueType,
    pub queue_name: String,
    pub project: String,
    pub experiment: String,
}

/// Labels for the per-backend "service pass ignored" counter (spec.md
/// §4.9: incremented whenever a pass is skipped because the lifecycle
/// state does not permit dispatch).
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct BackendLabels {
    pub queue_type: QueueType,
}

#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    /// Started/completed ticks, labeled per spec.md §4.10 step 2.
    pub experiments_started: Family<ExperimentLabels, Counter>,
    pub experiments_completed: Family<ExperimentLabels, Counter>,
    /// Global counters the Limiter (C11) polls directly: unlabeled so
    /// reading them never allocates or iterates a family.
    pub tasks_running: Gauge,
    pub tasks_completed: Counter,
    /// Backend-service "ignored this pass" counter (spec.md §4.9).
    pub backend_ignored: Family<BackendLabels, Counter>,
    /// Backend-service discovery-pass failure counter.
    pub backend_discovery_failures: Family<BackendLabels, Counter>,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let experiments_started = Family::<ExperimentLabels, Counter>::default();
        registry.register(
            "qrunner_experiments_started_total",
            "Experiments that began processing",
            experiments_started.clone(),
        );

        let experiments_completed = Family::<ExperimentLabels, Counter>::default();
        registry.register(
            "qrunner_experiments_completed_total",
            "Experiments that finished processing (ack or nack)",
            experiments_completed.clone(),
        );

        let tasks_running = Gauge::default();
        registry.register(
            "qrunner_tasks_running",
            "Tasks currently being processed on this node",
            tasks_running.clone(),
        );

        let tasks_completed = Counter::default();
        registry.register(
            "qrunner_tasks_completed_total",
            "Tasks that finished processing on this node",
            tasks_completed.clone(),
        );

        let backend_ignored = Family::<BackendLabels, Counter>::default();
        registry.register(
            "qrunner_backend_service_ignored_total",
            "Backend service passes skipped due to lifecycle state",
            backend_ignored.clone(),
        );

        let backend_discovery_failures = Family::<BackendLabels, Counter>::default();
        registry.register(
            "qrunner_backend_discovery_failures_total",
            "Backend service enumeration passes that failed",
            backend_discovery_failures.clone(),
        );

        Self {
            registry: Arc::new(registry),
            experiments_started,
            experiments_completed,
            tasks_running,
            tasks_completed,
            backend_ignored,
            backend_discovery_failures,
        }
    }

    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        let _ = prometheus_client::encoding::text::encode(&mut buffer, &self.registry);
        buffer
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message Handler (C10, spec.md §4.10): invoked per dequeued message.
//! Parses the payload through an injected `ProcessorFactory`, runs the
//! (external) Executor behind the `Processor` trait, and emits progress
//! reports while keeping the running/completed metrics counters correct
//! regardless of how the call ends.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use qrunner_adapters::{HandlerOutcome, TaskHandler};
use qrunner_core::{CoreError, Disposition, IdGen, ProgressState, QueueTask, Report, ResourceEnvelope};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::metrics::{ExperimentLabels, Metrics, QueueType};

/// A source of wall-clock epoch milliseconds, abstracted so tests don't
/// depend on real time (mirrors `qrunner_core::Clock`'s separation of
/// monotonic time from production).
pub trait WallClock: Send + Sync {
    fn now_epoch_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemWallClock;

impl WallClock for SystemWallClock {
    fn now_epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// What the (external) Executor returns once it has run an experiment to
/// completion (spec.md §4.10 step 4). `err` is carried separately from
/// `ack` because a transient I/O failure and a deterministic bad-payload
/// failure can both set `err` while disagreeing on `ack` (spec.md §7).
pub struct ProcessOutcome {
    pub ack: bool,
    pub resource_observed: Option<ResourceEnvelope>,
    pub err: Option<CoreError>,
}

impl ProcessOutcome {
    pub fn success(resource_observed: Option<ResourceEnvelope>) -> Self {
        Self {
            ack: true,
            resource_observed,
            err: None,
        }
    }

    pub fn retry(err: CoreError) -> Self {
        Self {
            ack: false,
            resource_observed: None,
            err: Some(err),
        }
    }

    pub fn dump(err: CoreError) -> Self {
        Self {
            ack: true,
            resource_observed: None,
            err: Some(err),
        }
    }
}

/// The (external) experiment executor, reached only through this trait
/// (spec.md §9's "tagged variants behind the Processor interface").
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    async fn process(&self, cancel: CancellationToken) -> ProcessOutcome;
}

/// A task payload parsed into a runnable `Processor`, plus the
/// experiment identifier carried in the payload (used for metrics labels
/// and idempotency, never inspected further by the core).
pub struct ParsedTask {
    pub experiment_id: String,
    pub processor: Box<dyn Processor>,
}

/// External collaborator (spec.md §1's "Processor Factory"): parses a raw
/// task payload, rejecting unencrypted messages unless `allow_cleartext`
/// is set, and folds environment-variable cloud credentials into the
/// parsed request when the request lacks them.
#[async_trait]
pub trait ProcessorFactory: Send + Sync + 'static {
    async fn create(&self, task: &QueueTask, allow_cleartext: bool) -> Result<ParsedTask, CoreError>;
}

/// Message Handler (C10). One instance is shared across every Queuer on
/// the node; it carries no per-queue state of its own.
pub struct MessageHandler<F, W, G>
where
    F: ProcessorFactory,
    W: WallClock,
    G: IdGen,
{
    factory: Arc<F>,
    metrics: Arc<Metrics>,
    wall_clock: W,
    id_gen: G,
    host: String,
    allow_cleartext: bool,
    queue_type: QueueType,
}

impl<F, W, G> MessageHandler<F, W, G>
where
    F: ProcessorFactory,
    W: WallClock,
    G: IdGen,
{
    pub fn new(
        factory: Arc<F>,
        metrics: Arc<Metrics>,
        wall_clock: W,
        id_gen: G,
        host: impl Into<String>,
        allow_cleartext: bool,
        queue_type: QueueType,
    ) -> Self {
        Self {
            factory,
            metrics,
            wall_clock,
            id_gen,
            host: host.into(),
            allow_cleartext,
            queue_type,
        }
    }

    fn unique_id(&self) -> String {
        format!("{}-{}", self.host, self.id_gen.next())
    }
}

/// Ensures the running gauge is decremented and the completed counter is
/// incremented exactly once no matter how `handle` returns, mirroring
/// spec.md §4.10 step 6's "panic-safe deferred block".
struct RunningGuard {
    metrics: Arc<Metrics>,
}

impl RunningGuard {
    fn enter(metrics: Arc<Metrics>) -> Self {
        metrics.tasks_running.inc();
        Self { metrics }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.metrics.tasks_running.dec();
        self.metrics.tasks_completed.inc();
    }
}

#[async_trait]
impl<F, W, G> TaskHandler for MessageHandler<F, W, G>
where
    F: ProcessorFactory,
    W: WallClock,
    G: IdGen,
{
    async fn handle(&self, task: QueueTask, cancel: CancellationToken) -> HandlerOutcome {
        let parsed = match self.factory.create(&task, self.allow_cleartext).await {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(error = %err, queue = %task.queue, "payload validation failed, dumping message");
                return HandlerOutcome::ack(None);
            }
        };

        let labels = ExperimentLabels {
            host: self.host.clone(),
            queue_type: self.queue_type,
            queue_name: task.short_queue_name.clone(),
            project: task.project.to_string(),
            experiment: parsed.experiment_id.clone(),
        };
        self.metrics.experiments_started.get_or_create(&labels).inc();

        let unique_id = self.unique_id();
        let started_at = self.wall_clock.now_epoch_ms();
        task.try_send_report(Report::progress(
            &self.host,
            &unique_id,
            &parsed.experiment_id,
            started_at,
            ProgressState::Started,
            None,
        ));

        let guard = RunningGuard::enter(self.metrics.clone());
        let outcome = parsed.processor.process(cancel).await;
        drop(guard);
        self.metrics.experiments_completed.get_or_create(&labels).inc();

        let finished_at = self.wall_clock.now_epoch_ms();
        let (state, error_text) = if outcome.err.is_some() && !outcome.ack {
            (ProgressState::Failed, outcome.err.as_ref().map(|e| e.to_string()))
        } else if let Some(err) = &outcome.err {
            (ProgressState::Failed, Some(err.to_string()))
        } else {
            (ProgressState::Success, None)
        };
        task.try_send_report(Report::progress(
            &self.host,
            &unique_id,
            &parsed.experiment_id,
            finished_at,
            state,
            error_text,
        ));

        info!(
            experiment = %parsed.experiment_id,
            queue = %task.queue,
            ack = outcome.ack,
            "experiment finished"
        );

        HandlerOutcome {
            disposition: if outcome.ack { Disposition::Ack } else { Disposition::Nack },
            resource_observed: outcome.resource_observed,
        }
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;

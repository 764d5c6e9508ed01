// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queuer (C7, spec.md §4.7): the per-server actor. Three cooperating
//! loops — refresh, producer, consumer — rank and throttle one server's
//! queues and drive at most one in-flight worker per queue.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use qrunner_adapters::{EncryptionKeyStore, QueueAdapter, TaskHandler, WorkOutcome};
use qrunner_core::{Clock, CredentialHandle, QueueName, QueueTask, Report, ResourceEnvelope, ServerId};
use rand::seq::SliceRandom;
use regex::Regex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::busy::BusyRegistry;
use crate::backoff::{ttl, BackoffRegistry};
use crate::ledger::ResourceLedger;
use crate::subscriptions::SubscriptionTable;

const PRODUCER_TICK: Duration = Duration::from_secs(5);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);
const EXISTS_POLL_INTERVAL: Duration = Duration::from_secs(5);
const UNAVAILABILITY_THRESHOLD: Duration = Duration::from_secs(60 * 60);
const UNAVAILABILITY_REPEAT: Duration = Duration::from_secs(10 * 60);

/// A single-element handoff from the producer loop to the consumer loop:
/// "this queue passed its fit test, dispatch a worker for it."
struct SubRequest {
    queue: QueueName,
    credential: CredentialHandle,
    /// The envelope the dry-run fit test in `check` was performed
    /// against (zero if the queue's footprint isn't known yet). `do_work`
    /// converts this into a live allocation held for the duration of
    /// `Adapter.work`, so concurrent dispatches across queues on this
    /// node never oversubscribe the Resource Ledger (spec.md §8 invariant
    /// 3).
    resources: ResourceEnvelope,
}

/// Per-server actor owning exactly one `SubscriptionTable` (spec.md §3's
/// "Subscriptions are owned by their Queuer"). `Busy` and the `Resource
/// Ledger` are process-wide and shared across every Queuer on the node.
pub struct Queuer<A: QueueAdapter, C: Clock> {
    server: ServerId,
    adapter: A,
    clock: C,
    subscriptions: Arc<SubscriptionTable<C>>,
    backoff: Arc<BackoffRegistry<C>>,
    busy: Arc<BusyRegistry>,
    ledger: Arc<ResourceLedger>,
    handler: Arc<dyn TaskHandler>,
    name_match: Regex,
    name_mismatch: Regex,
    credentials: Mutex<HashMap<QueueName, CredentialHandle>>,
    last_successful_consume: Mutex<Instant>,
    last_alarm_at: Mutex<Option<Instant>>,
    /// Per-queue consecutive-failure TTL, so repeated transient errors
    /// back off multiplicatively (spec.md §4.2) instead of each failure
    /// independently resetting to the base TTL.
    failure_streak: Mutex<HashMap<String, Duration>>,
    /// Resolves a queue's response-encryption public key from
    /// `--encrypt-dir`, if configured (spec.md §6).
    encrypt_keys: Option<Arc<EncryptionKeyStore>>,
    /// Response-queue sender per queue, provisioned once via
    /// `Adapter.responder` and reused across messages (spec.md §4.6).
    responders: Mutex<HashMap<QueueName, mpsc::Sender<Report>>>,
}

impl<A: QueueAdapter, C: Clock + Clone + 'static> Queuer<A, C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        server: ServerId,
        adapter: A,
        clock: C,
        backoff: Arc<BackoffRegistry<C>>,
        busy: Arc<BusyRegistry>,
        ledger: Arc<ResourceLedger>,
        handler: Arc<dyn TaskHandler>,
        name_match: Regex,
        name_mismatch: Regex,
        encrypt_keys: Option<Arc<EncryptionKeyStore>>,
    ) -> Self {
        let subscriptions = Arc::new(SubscriptionTable::new(clock.clone()));
        let now = clock.now();
        Self {
            server,
            adapter,
            clock,
            subscriptions,
            backoff,
            busy,
            ledger,
            handler,
            name_match,
            name_mismatch,
            credentials: Mutex::new(HashMap::new()),
            last_successful_consume: Mutex::new(now),
            last_alarm_at: Mutex::new(None),
            failure_streak: Mutex::new(HashMap::new()),
            encrypt_keys,
            responders: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionTable<C>> {
        &self.subscriptions
    }

    pub fn busy(&self) -> &Arc<BusyRegistry> {
        &self.busy
    }

    /// Runs the three cooperating loops until `cancel` fires, then waits
    /// for all in-flight work spawned under it to return (cascading
    /// cancellation, spec.md §9).
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let (dummy_tx, dummy_rx) = mpsc::channel::<()>(1);
        let (req_tx, req_rx) = mpsc::channel::<SubRequest>(1);

        let refresh = tokio::spawn({
            let this = self.clone();
            let cancel = cancel.clone();
            async move { this.run_refresh_loop(cancel).await }
        });
        let producer = tokio::spawn({
            let this = self.clone();
            let cancel = cancel.clone();
            async move { this.run_producer_loop(dummy_tx, req_tx, cancel).await }
        });
        let consumer = tokio::spawn({
            let this = self.clone();
            let cancel = cancel.clone();
            async move { this.run_consumer_loop(dummy_rx, req_rx, cancel).await }
        });

        let _ = tokio::join!(refresh, producer, consumer);
        info!(server = %self.server, "queuer stopped");
    }

    /// Refresh loop (spec.md §4.7 step 1): every `RefreshInterval`, call
    /// `Adapter.refresh`, align it into the Subscription Table, and log
    /// what changed.
    async fn run_refresh_loop(&self, cancel: CancellationToken) {
        loop {
            match self.adapter.refresh(&self.name_match, &self.name_mismatch).await {
                Ok(found) => {
                    let mut creds = self.credentials.lock();
                    creds.clear();
                    creds.extend(found.iter().map(|(q, c)| (q.clone(), c.clone())));
                    drop(creds);

                    let seen: HashSet<QueueName> = found.keys().cloned().collect();
                    let delta = self.subscriptions.align(&seen);
                    if !delta.added.is_empty() || !delta.removed.is_empty() {
                        info!(
                            server = %self.server,
                            added = ?delta.added,
                            removed = ?delta.removed,
                            "refreshed server's queues"
                        );
                    }
                }
                Err(err) => {
                    warn!(server = %self.server, error = %err, "refresh failed");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.adapter.refresh_interval()) => {}
                _ = cancel.cancelled() => return,
            }
        }
    }

    /// Producer loop (spec.md §4.7 step 2): every ~5s, rank candidates,
    /// drop backed-off queues, pick one idle queue at random, and `check`
    /// it.
    async fn run_producer_loop(
        &self,
        dummy_tx: mpsc::Sender<()>,
        req_tx: mpsc::Sender<SubRequest>,
        cancel: CancellationToken,
    ) {
        loop {
            if let Some(queue) = self.pick_candidate() {
                self.check(&queue, &dummy_tx, &req_tx).await;
            }
            // Checked every tick, not just when no candidate was picked:
            // a candidate can be selected every pass yet never actually
            // consume anything (e.g. its resource fit test keeps failing,
            // which sets no backoff), so gating the alarm on "no
            // candidate" would mask that case (spec.md §4.7).
            self.maybe_emit_unavailability_alarm();

            tokio::select! {
                _ = tokio::time::sleep(PRODUCER_TICK) => {}
                _ = cancel.cancelled() => return,
            }
        }
    }

    /// Builds the ranked candidate list (in-flight ascending, ties broken
    /// by a Fisher-Yates shuffle), drops queues with an active Backoff
    /// entry, and returns one queue from the idle prefix (`in_flight==0`)
    /// at random, or `None` if no idle queue is eligible.
    fn pick_candidate(&self) -> Option<QueueName> {
        let mut snapshots = self.subscriptions.all();
        snapshots.retain(|s| !self.backoff.get(&self.server.scoped(&s.queue)));
        if snapshots.is_empty() {
            return None;
        }

        snapshots.sort_by_key(|s| s.in_flight);
        let floor = snapshots[0].in_flight;
        let mut idle: Vec<QueueName> = snapshots
            .into_iter()
            .take_while(|s| s.in_flight == floor)
            .filter(|s| s.is_idle())
            .map(|s| s.queue)
            .collect();
        if idle.is_empty() {
            return None;
        }
        idle.shuffle(&mut rand::thread_rng());
        idle.into_iter().next()
    }

    /// Two-stage handshake proving the consumer loop is idle, followed by
    /// a dry-run resource fit test; only on both succeeding is the real
    /// `SubRequest` forwarded (spec.md §4.7's `check`). Failures here
    /// signal contention, not unavailability, so they never schedule a
    /// Backoff entry.
    async fn check(&self, queue: &QueueName, dummy_tx: &mpsc::Sender<()>, req_tx: &mpsc::Sender<SubRequest>) {
        if dummy_tx.try_send(()).is_err() {
            debug!(server = %self.server, queue = %queue, "consumer busy, skipping this tick");
            return;
        }

        let last_resources = self.subscriptions.snapshot(queue).and_then(|s| s.last_resources);
        let resources = last_resources.unwrap_or_default();
        if last_resources.is_some() {
            if let Err(err) = self.ledger.alloc(&resources, false) {
                debug!(server = %self.server, queue = %queue, error = %err, "resource fit test failed, skipping this pass");
                return;
            }
        }

        let Some(credential) = self.credentials.lock().get(queue).cloned() else {
            debug!(server = %self.server, queue = %queue, "queue dropped from credential map mid-check");
            return;
        };

        let request = SubRequest {
            queue: queue.clone(),
            credential,
            resources,
        };
        match tokio::time::timeout(HANDSHAKE_TIMEOUT, req_tx.send(request)).await {
            Ok(Ok(())) => {}
            _ => debug!(server = %self.server, queue = %queue, "consumer did not pick up handoff in time"),
        }
    }

    /// Consumer loop (spec.md §4.7 step 3): waits for the producer's
    /// readiness handshake, then for the matching `SubRequest`, and
    /// dispatches `do_work` for it.
    async fn run_consumer_loop(
        self: &Arc<Self>,
        mut dummy_rx: mpsc::Receiver<()>,
        mut req_rx: mpsc::Receiver<SubRequest>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                dummy = dummy_rx.recv() => {
                    if dummy.is_none() {
                        return;
                    }
                    match tokio::time::timeout(HANDSHAKE_TIMEOUT, req_rx.recv()).await {
                        Ok(Some(req)) => {
                            let this = self.clone();
                            let worker_cancel = cancel.child_token();
                            tokio::spawn(async move { this.do_work(req, worker_cancel).await });
                        }
                        _ => continue,
                    }
                }
                _ = cancel.cancelled() => return,
            }
        }
    }

    /// Drives the full lifecycle of one (project, queue) dispatch (spec.md
    /// §4.7's state machine): acquire Busy, launch `Adapter.work`, run a
    /// parallel existence probe that cancels the work if the queue
    /// disappears, then release Busy on any exit path.
    async fn do_work(&self, req: SubRequest, cancel: CancellationToken) {
        let fq_name = self.server.scoped(&req.queue);
        let Some(_guard) = self.busy.try_acquire_guard(fq_name.clone()) else {
            return;
        };

        if self.subscriptions.inc_workers(&req.queue).is_err() {
            // Queue dropped from the table concurrently; benign (spec.md §4.5).
            return;
        }

        // Convert the dry-run fit test into a live hold for the duration
        // of this message (spec.md §4.4): another queue's concurrent
        // dispatch on this node must see the reduced free envelope.
        let allocation = match self.ledger.alloc(&req.resources, true) {
            Ok(allocation) => allocation,
            Err(err) => {
                debug!(server = %self.server, queue = %req.queue, error = %err, "resource exhausted at dispatch time, skipping this pass");
                let _ = self.subscriptions.dec_workers(&req.queue);
                return;
            }
        };

        let exists_cancel = cancel.child_token();
        let exists_probe = tokio::spawn({
            let adapter = self.adapter.clone();
            let queue = req.queue.clone();
            let exists_cancel = exists_cancel.clone();
            let probe_cancel = cancel.clone();
            async move {
                let mut tick = tokio::time::interval(EXISTS_POLL_INTERVAL);
                loop {
                    tokio::select! {
                        _ = tick.tick() => {
                            match adapter.exists(&queue).await {
                                Ok(true) => {}
                                Ok(false) => {
                                    warn!(queue = %queue, "queue disappeared mid-processing, cancelling worker");
                                    probe_cancel.cancel();
                                    return;
                                }
                                Err(err) => warn!(queue = %queue, error = %err, "exists probe failed"),
                            }
                        }
                        _ = exists_cancel.cancelled() => return,
                    }
                }
            }
        });

        let started_at = self.clock.now();
        let response_sender = self.responder_for(&req.queue).await;
        let timed_handler = Arc::new(RecordingHandler {
            inner: self.handler.clone(),
            last: Mutex::new(None),
            response_sender,
        });
        let outcome = self
            .adapter
            .work(&req.queue, &req.credential, timed_handler.as_ref(), cancel.clone())
            .await;
        exists_cancel.cancel();
        let _ = exists_probe.await;

        for warning in self.ledger.release(&allocation) {
            warn!(server = %self.server, queue = %req.queue, %warning, "resource ledger release warning");
        }

        match outcome {
            Ok(WorkOutcome::Processed) => {
                *self.last_successful_consume.lock() = self.clock.now();
                let elapsed = self.clock.now().saturating_duration_since(started_at);
                let _ = self.subscriptions.record_exec_time(&req.queue, elapsed);
                if let Some(resources) = timed_handler.observed_resources() {
                    let _ = self.subscriptions.set_resources(&req.queue, resources);
                }
                self.failure_streak.lock().remove(&fq_name);
                self.backoff.set(fq_name, ttl::AFTER_SUCCESS);
            }
            Ok(WorkOutcome::NoMessage) => {
                self.failure_streak.lock().remove(&fq_name);
                self.backoff.set(fq_name, ttl::AFTER_SUCCESS);
            }
            Err(err) => {
                warn!(queue = %req.queue, error = %err, "adapter work call failed");
                let mut streak = self.failure_streak.lock();
                let next_ttl = ttl::next_failure_ttl(streak.get(&fq_name).copied());
                streak.insert(fq_name.clone(), next_ttl);
                drop(streak);
                self.backoff.set(fq_name, next_ttl);
            }
        }

        let _ = self.subscriptions.dec_workers(&req.queue);
    }

    /// Liveness alarm (spec.md §4.7): if no idle queue has successfully
    /// consumed work in an hour, warn every 10 minutes, time-shifted so
    /// the warning doesn't repeat on every producer tick.
    fn maybe_emit_unavailability_alarm(&self) {
        let now = self.clock.now();
        let idle_for = now.saturating_duration_since(*self.last_successful_consume.lock());
        if idle_for < UNAVAILABILITY_THRESHOLD {
            return;
        }
        let mut last_alarm = self.last_alarm_at.lock();
        if last_alarm.map(|t| now.saturating_duration_since(t) < UNAVAILABILITY_REPEAT).unwrap_or(false) {
            return;
        }
        *last_alarm = Some(now);
        warn!(server = %self.server, idle_for = ?idle_for, "no queue on this server has consumed work in over an hour");
    }

    /// Provisions (once per queue, then cached) the response-queue sender
    /// the spec's PURPOSE & SCOPE names as a headline capability: "reports
    /// progress on a separate response queue". Resolves the queue's
    /// encryption public key from `--encrypt-dir` if configured, and asks
    /// the adapter to seal reports with it. A provisioning failure is
    /// logged and treated as "no sender this round" rather than aborting
    /// dispatch — reporting is best-effort, never a reason to skip the
    /// experiment itself.
    async fn responder_for(&self, queue: &QueueName) -> Option<mpsc::Sender<Report>> {
        if let Some(sender) = self.responders.lock().get(queue).cloned() {
            return Some(sender);
        }
        let public_key = self
            .encrypt_keys
            .as_ref()
            .and_then(|store| store.public_key_for(queue.as_str()));
        match self.adapter.responder(queue, public_key.as_deref()).await {
            Ok(sender) => {
                self.responders.lock().insert(queue.clone(), sender.clone());
                Some(sender)
            }
            Err(err) => {
                warn!(server = %self.server, queue = %queue, error = %err, "failed to provision response-queue sender");
                None
            }
        }
    }
}

/// Wraps the shared Message Handler to capture the resource envelope it
/// observed, so the Queuer can feed it back into the Subscription Table
/// after `Adapter.work` returns (the adapter itself only sees the
/// `HandlerOutcome`, not where it should be recorded), and to attach the
/// queue's response-queue sender to the task before the inner handler
/// sees it (the adapter builds the `QueueTask` itself and has no
/// knowledge of `--encrypt-dir` or the Queuer's per-queue responder
/// cache).
struct RecordingHandler {
    inner: Arc<dyn TaskHandler>,
    last: Mutex<Option<ResourceEnvelope>>,
    response_sender: Option<mpsc::Sender<Report>>,
}

impl RecordingHandler {
    fn observed_resources(&self) -> Option<ResourceEnvelope> {
        *self.last.lock()
    }
}

#[async_trait::async_trait]
impl TaskHandler for RecordingHandler {
    async fn handle(&self, task: QueueTask, cancel: CancellationToken) -> qrunner_adapters::HandlerOutcome {
        let task = match &self.response_sender {
            Some(sender) => task.with_response_sender(sender.clone()),
            None => task,
        };
        let outcome = self.inner.handle(task, cancel).await;
        *self.last.lock() = outcome.resource_observed.clone();
        outcome
    }
}

#[cfg(test)]
#[path = "queuer_tests.rs"]
mod tests;

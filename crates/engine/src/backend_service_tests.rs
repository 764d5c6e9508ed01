// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::busy::BusyRegistry;
use crate::ledger::ResourceLedger;
use qrunner_adapters::{FakeQueueAdapter, HandlerOutcome};
use qrunner_core::{FakeClock, QueueTask};
use std::sync::atomic::AtomicUsize;

struct NoopHandler;

#[async_trait::async_trait]
impl qrunner_adapters::TaskHandler for NoopHandler {
    async fn handle(&self, _task: QueueTask, _cancel: CancellationToken) -> HandlerOutcome {
        HandlerOutcome::ack(None)
    }
}

struct CountingDiscovery {
    calls: Arc<AtomicUsize>,
    servers: Vec<ServerId>,
    fail: bool,
}

#[async_trait]
impl ServerDiscovery for CountingDiscovery {
    async fn discover(&self) -> Result<Vec<ServerId>, DiscoveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(DiscoveryError("boom".into()))
        } else {
            Ok(self.servers.clone())
        }
    }
}

fn registry() -> Arc<ServersRegistry<FakeQueueAdapter, FakeClock>> {
    Arc::new(ServersRegistry::new(
        |_: &ServerId| FakeQueueAdapter::new(),
        FakeClock::new(),
        Arc::new(crate::backoff::BackoffRegistry::new(FakeClock::new())),
        Arc::new(BusyRegistry::new()),
        Arc::new(ResourceLedger::new(4, 0, 0, Vec::new())),
        Arc::new(NoopHandler) as Arc<dyn qrunner_adapters::TaskHandler>,
        Regex::new(".*").unwrap(),
        Regex::new("^$").unwrap(),
        None,
    ))
}

#[tokio::test(start_paused = true)]
async fn ignored_pass_never_calls_discovery() {
    let calls = Arc::new(AtomicUsize::new(0));
    let lifecycle = Arc::new(LifecycleBroadcaster::new());
    lifecycle.publish(LifecycleState::DrainAndSuspend).await;
    let metrics = Arc::new(Metrics::new());

    let service = Arc::new(BackendService::new(
        QueueType::Amqp,
        CountingDiscovery { calls: calls.clone(), servers: vec![], fail: false },
        registry(),
        lifecycle,
        metrics,
        Duration::from_millis(10),
        DispatchRule::Strict,
    ));
    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { service.run(cancel).await }
    });

    tokio::time::advance(Duration::from_millis(35)).await;
    cancel.cancel();
    let _ = handle.await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn cloud_tolerant_rule_dispatches_on_unknown() {
    let calls = Arc::new(AtomicUsize::new(0));
    let lifecycle = Arc::new(LifecycleBroadcaster::new());
    let metrics = Arc::new(Metrics::new());
    let reg = registry();

    let service = Arc::new(BackendService::new(
        QueueType::Sqs,
        CountingDiscovery {
            calls: calls.clone(),
            servers: vec![ServerId::new("region-a")],
            fail: false,
        },
        reg.clone(),
        lifecycle,
        metrics,
        Duration::from_millis(10),
        DispatchRule::CloudTolerant,
    ));
    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { service.run(cancel).await }
    });

    tokio::time::advance(Duration::from_millis(15)).await;
    cancel.cancel();
    let _ = handle.await;

    assert!(calls.load(Ordering::SeqCst) >= 1);
    assert_eq!(reg.server_count(), 0); // cancelled on shutdown
}

#[tokio::test(start_paused = true)]
async fn strict_rule_ignores_unknown() {
    let calls = Arc::new(AtomicUsize::new(0));
    let lifecycle = Arc::new(LifecycleBroadcaster::new());
    let metrics = Arc::new(Metrics::new());

    let service = Arc::new(BackendService::new(
        QueueType::Amqp,
        CountingDiscovery { calls: calls.clone(), servers: vec![], fail: false },
        registry(),
        lifecycle,
        metrics,
        Duration::from_millis(10),
        DispatchRule::Strict,
    ));
    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { service.run(cancel).await }
    });

    tokio::time::advance(Duration::from_millis(35)).await;
    cancel.cancel();
    let _ = handle.await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_discovery_doubles_interval_up_to_ceiling() {
    let calls = Arc::new(AtomicUsize::new(0));
    let lifecycle = Arc::new(LifecycleBroadcaster::new());
    lifecycle.publish(LifecycleState::Running).await;
    let metrics = Arc::new(Metrics::new());

    let service = BackendService::new(
        QueueType::File,
        CountingDiscovery { calls, servers: vec![], fail: true },
        registry(),
        lifecycle,
        metrics,
        Duration::from_secs(3),
        DispatchRule::CloudTolerant,
    );

    assert_eq!(service.interval(), Duration::from_secs(3));
    service.double_interval();
    assert_eq!(service.interval(), Duration::from_secs(6));
    for _ in 0..10 {
        service.double_interval();
    }
    assert_eq!(service.interval(), FAILURE_CEILING);
}

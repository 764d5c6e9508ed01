// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use qrunner_core::FakeClock;

fn metrics() -> Arc<Metrics> {
    Arc::new(Metrics::new())
}

#[test]
fn clamps_interval_below_floor_and_reports_it() {
    let (config, clamped) = LimiterConfig {
        max_tasks: None,
        max_idle: None,
        limit_interval: Duration::from_secs(30),
    }
    .clamped();
    assert!(clamped);
    assert_eq!(config.limit_interval, MINIMUM_LIMIT_INTERVAL);
}

#[test]
fn leaves_interval_above_floor_untouched() {
    let (config, clamped) = LimiterConfig {
        max_tasks: None,
        max_idle: None,
        limit_interval: Duration::from_secs(600),
    }
    .clamped();
    assert!(!clamped);
    assert_eq!(config.limit_interval, Duration::from_secs(600));
}

#[tokio::test(start_paused = true)]
async fn shuts_down_once_max_tasks_reached_and_idle() {
    let clock = FakeClock::new();
    let m = metrics();
    m.tasks_completed.inc_by(5);
    let limiter = Limiter::new(
        clock,
        LimiterConfig {
            max_tasks: Some(5),
            max_idle: None,
            limit_interval: Duration::from_secs(1),
        },
        m,
        NoNewTasksFlag::new(),
    );
    assert!(limiter.tick());
}

#[tokio::test(start_paused = true)]
async fn sets_no_new_tasks_flag_instead_of_shutting_down_while_work_is_running() {
    let clock = FakeClock::new();
    let m = metrics();
    m.tasks_completed.inc_by(4);
    m.tasks_running.set(1);
    let flag = NoNewTasksFlag::new();
    let limiter = Limiter::new(
        clock,
        LimiterConfig {
            max_tasks: Some(5),
            max_idle: None,
            limit_interval: Duration::from_secs(1),
        },
        m,
        flag.clone(),
    );
    assert!(!limiter.tick());
    assert!(flag.is_set());
}

#[tokio::test(start_paused = true)]
async fn does_not_shut_down_while_below_the_task_ceiling() {
    let clock = FakeClock::new();
    let m = metrics();
    m.tasks_completed.inc_by(2);
    let limiter = Limiter::new(
        clock,
        LimiterConfig {
            max_tasks: Some(5),
            max_idle: None,
            limit_interval: Duration::from_secs(1),
        },
        m,
        NoNewTasksFlag::new(),
    );
    assert!(!limiter.tick());
}

#[tokio::test(start_paused = true)]
async fn shuts_down_after_max_idle_duration_elapses() {
    let clock = FakeClock::new();
    let m = metrics();
    let limiter = Limiter::new(
        clock.clone(),
        LimiterConfig {
            max_tasks: None,
            max_idle: Some(Duration::from_secs(60)),
            limit_interval: Duration::from_secs(1),
        },
        m,
        NoNewTasksFlag::new(),
    );
    assert!(!limiter.tick());
    clock.advance(Duration::from_secs(61));
    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(limiter.tick());
}

#[tokio::test(start_paused = true)]
async fn idle_clock_resets_whenever_a_task_is_running() {
    let clock = FakeClock::new();
    let m = metrics();
    m.tasks_running.set(1);
    let limiter = Limiter::new(
        clock.clone(),
        LimiterConfig {
            max_tasks: None,
            max_idle: Some(Duration::from_secs(60)),
            limit_interval: Duration::from_secs(1),
        },
        m.clone(),
        NoNewTasksFlag::new(),
    );
    clock.advance(Duration::from_secs(120));
    tokio::time::advance(Duration::from_secs(120)).await;
    assert!(!limiter.tick());

    m.tasks_running.set(0);
    clock.advance(Duration::from_secs(10));
    tokio::time::advance(Duration::from_secs(10)).await;
    assert!(!limiter.tick());
}

#[tokio::test(start_paused = true)]
async fn run_cancels_root_token_once_a_condition_fires() {
    let clock = FakeClock::new();
    let m = metrics();
    m.tasks_completed.inc_by(1);
    let limiter = Arc::new(Limiter::new(
        clock,
        LimiterConfig {
            max_tasks: Some(1),
            max_idle: None,
            limit_interval: Duration::from_millis(10),
        },
        m,
        NoNewTasksFlag::new(),
    ));
    let root = CancellationToken::new();
    let handle = tokio::spawn(limiter.run(root.clone()));

    tokio::time::advance(Duration::from_millis(20)).await;
    handle.await.unwrap();
    assert!(root.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn run_exits_promptly_when_root_is_cancelled_externally() {
    let clock = FakeClock::new();
    let m = metrics();
    let limiter = Arc::new(Limiter::new(
        clock,
        LimiterConfig {
            max_tasks: None,
            max_idle: None,
            limit_interval: Duration::from_secs(3600),
        },
        m,
        NoNewTasksFlag::new(),
    ));
    let root = CancellationToken::new();
    let handle = tokio::spawn(limiter.run(root.clone()));
    root.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn propagator_freezes_registries_once_flag_trips() {
    use crate::backoff::BackoffRegistry;
    use crate::busy::BusyRegistry;
    use crate::ledger::ResourceLedger;
    use crate::servers::ServersRegistry;
    use async_trait::async_trait;
    use qrunner_adapters::{FakeQueueAdapter, HandlerOutcome, TaskHandler};
    use qrunner_core::{QueueTask, ServerId};
    use regex::Regex;

    struct NoopHandler;
    #[async_trait]
    impl TaskHandler for NoopHandler {
        async fn handle(&self, _task: QueueTask, _cancel: CancellationToken) -> HandlerOutcome {
            HandlerOutcome::ack(None)
        }
    }

    let registry = Arc::new(ServersRegistry::new(
        |_: &ServerId| FakeQueueAdapter::new(),
        FakeClock::new(),
        Arc::new(BackoffRegistry::new(FakeClock::new())),
        Arc::new(BusyRegistry::new()),
        Arc::new(ResourceLedger::new(4, 0, 0, Vec::new())),
        Arc::new(NoopHandler) as Arc<dyn TaskHandler>,
        Regex::new(".*").unwrap(),
        Regex::new("^$").unwrap(),
        None,
    ));

    let flag = NoNewTasksFlag::new();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(flag.clone().run_propagator(
        vec![registry.clone() as Arc<dyn crate::servers::OpenForBusiness>],
        cancel.clone(),
    ));

    flag.set();
    tokio::time::advance(Duration::from_secs(2)).await;
    handle.await.unwrap();

    let parent = CancellationToken::new();
    registry.cycle(&[ServerId::new("region-a")], &parent);
    assert_eq!(registry.server_count(), 0, "cycle must be a no-op once frozen");
}

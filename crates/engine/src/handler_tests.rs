// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use qrunner_core::{CredentialHandle, QueueName, SequentialIdGen, ServerId};
use std::sync::atomic::{AtomicU64, Ordering};

struct FixedWallClock;
impl WallClock for FixedWallClock {
    fn now_epoch_ms(&self) -> u64 {
        1_000
    }
}

struct StubProcessor {
    outcome: std::sync::Mutex<Option<ProcessOutcome>>,
}

#[async_trait::async_trait]
impl Processor for StubProcessor {
    async fn process(&self, _cancel: CancellationToken) -> ProcessOutcome {
        self.outcome.lock().unwrap().take().expect("process called once")
    }
}

struct StubFactory {
    fail_parse: bool,
    next_outcome: fn() -> ProcessOutcome,
}

#[async_trait::async_trait]
impl ProcessorFactory for StubFactory {
    async fn create(&self, task: &QueueTask, _allow_cleartext: bool) -> Result<ParsedTask, CoreError> {
        if self.fail_parse {
            return Err(CoreError::PayloadValidation {
                experiment: "unknown".into(),
                reason: "bad payload".into(),
            });
        }
        Ok(ParsedTask {
            experiment_id: format!("exp-{}", task.short_queue_name),
            processor: Box::new(StubProcessor {
                outcome: std::sync::Mutex::new(Some((self.next_outcome)())),
            }),
        })
    }
}

fn make_task(queue: &str) -> QueueTask {
    QueueTask::new(
        ServerId::new("srv"),
        QueueName::new(queue),
        queue.to_string(),
        CredentialHandle::new("cred"),
        b"payload".to_vec(),
    )
}

fn handler(factory: StubFactory) -> MessageHandler<StubFactory, FixedWallClock, SequentialIdGen> {
    MessageHandler::new(
        Arc::new(factory),
        Arc::new(Metrics::new()),
        FixedWallClock,
        SequentialIdGen::new("test"),
        "host1",
        false,
        QueueType::Amqp,
    )
}

#[tokio::test]
async fn successful_process_acks_and_increments_completed() {
    let h = handler(StubFactory {
        fail_parse: false,
        next_outcome: || ProcessOutcome::success(None),
    });
    let outcome = h.handle(make_task("q1"), CancellationToken::new()).await;
    assert_eq!(outcome.disposition, Disposition::Ack);
    assert_eq!(h.metrics.tasks_completed.get(), 1);
    assert_eq!(h.metrics.tasks_running.get(), 0);
}

#[tokio::test]
async fn retry_outcome_nacks() {
    let h = handler(StubFactory {
        fail_parse: false,
        next_outcome: || {
            ProcessOutcome::retry(CoreError::TransientQueue {
                project: "p".into(),
                queue: "q".into(),
                source: Box::new(std::io::Error::other("boom")),
            })
        },
    });
    let outcome = h.handle(make_task("q1"), CancellationToken::new()).await;
    assert_eq!(outcome.disposition, Disposition::Nack);
}

#[tokio::test]
async fn parse_failure_dumps_without_running_processor() {
    let h = handler(StubFactory {
        fail_parse: true,
        next_outcome: || ProcessOutcome::success(None),
    });
    let outcome = h.handle(make_task("q1"), CancellationToken::new()).await;
    assert_eq!(outcome.disposition, Disposition::Ack);
    // Parse failures never enter the RunningGuard.
    assert_eq!(h.metrics.tasks_completed.get(), 0);
}

#[tokio::test]
async fn running_gauge_is_decremented_even_on_dump_outcome() {
    let h = handler(StubFactory {
        fail_parse: false,
        next_outcome: || {
            ProcessOutcome::dump(CoreError::PayloadValidation {
                experiment: "e".into(),
                reason: "bad".into(),
            })
        },
    });
    h.handle(make_task("q1"), CancellationToken::new()).await;
    assert_eq!(h.metrics.tasks_running.get(), 0);
    assert_eq!(h.metrics.tasks_completed.get(), 1);
}

static REPORT_COUNT: AtomicU64 = AtomicU64::new(0);

#[tokio::test]
async fn reports_sent_on_response_channel_when_present() {
    REPORT_COUNT.store(0, Ordering::SeqCst);
    let h = handler(StubFactory {
        fail_parse: false,
        next_outcome: || ProcessOutcome::success(None),
    });
    let (tx, mut rx) = tokio::sync::mpsc::channel(8);
    let task = make_task("q1").with_response_sender(tx);
    h.handle(task, CancellationToken::new()).await;
    drop(h);
    let mut count = 0;
    while let Ok(Some(_)) = tokio::time::timeout(std::time::Duration::from_millis(50), rx.recv()).await {
        count += 1;
    }
    assert_eq!(count, 2); // Started + Success
}

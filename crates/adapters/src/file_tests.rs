// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::adapter::HandlerOutcome;

struct FixedOutcome(qrunner_core::Disposition);

#[async_trait]
impl TaskHandler for FixedOutcome {
    async fn handle(&self, task: QueueTask, _cancel: CancellationToken) -> HandlerOutcome {
        assert_eq!(task.payload, b"hello");
        HandlerOutcome {
            disposition: self.0,
            resource_observed: None,
        }
    }
}

fn any_regex() -> Regex {
    Regex::new(".*").unwrap()
}

fn none_regex() -> Regex {
    Regex::new("$^").unwrap()
}

#[tokio::test]
async fn refresh_discovers_non_hidden_subdirectories() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir(tmp.path().join("jobs")).unwrap();
    std::fs::create_dir(tmp.path().join(".inflight")).unwrap();

    let adapter = FileAdapter::new(tmp.path());
    let found = adapter.refresh(&any_regex(), &none_regex()).await.unwrap();
    assert_eq!(found.len(), 1);
    assert!(found.contains_key(&QueueName::new("jobs")));
}

#[tokio::test]
async fn work_returns_no_message_for_empty_queue() {
    let tmp = tempfile::tempdir().unwrap();
    let queue_dir = tmp.path().join("jobs");
    std::fs::create_dir(&queue_dir).unwrap();

    let adapter = FileAdapter::new(tmp.path());
    let outcome = adapter
        .work(
            &QueueName::new("jobs"),
            &CredentialHandle::new("c"),
            &FixedOutcome(qrunner_core::Disposition::Ack),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(outcome, WorkOutcome::NoMessage);
}

#[tokio::test]
async fn acked_message_is_deleted_from_inflight() {
    let tmp = tempfile::tempdir().unwrap();
    let queue_dir = tmp.path().join("jobs");
    std::fs::create_dir(&queue_dir).unwrap();
    std::fs::write(queue_dir.join("msg-1"), b"hello").unwrap();

    let adapter = FileAdapter::new(tmp.path());
    let outcome = adapter
        .work(
            &QueueName::new("jobs"),
            &CredentialHandle::new("c"),
            &FixedOutcome(qrunner_core::Disposition::Ack),
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(outcome, WorkOutcome::Processed);
    assert!(!queue_dir.join(INFLIGHT_DIR).join("msg-1").exists());
    assert!(!queue_dir.join("msg-1").exists());
}

#[tokio::test]
async fn nacked_message_is_restored_to_the_queue_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let queue_dir = tmp.path().join("jobs");
    std::fs::create_dir(&queue_dir).unwrap();
    std::fs::write(queue_dir.join("msg-1"), b"hello").unwrap();

    let adapter = FileAdapter::new(tmp.path());
    adapter
        .work(
            &QueueName::new("jobs"),
            &CredentialHandle::new("c"),
            &FixedOutcome(qrunner_core::Disposition::Nack),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(queue_dir.join("msg-1").exists());
    assert!(!queue_dir.join(INFLIGHT_DIR).join("msg-1").exists());
}

#[tokio::test]
async fn has_work_and_exists_reflect_directory_state() {
    let tmp = tempfile::tempdir().unwrap();
    let queue_dir = tmp.path().join("jobs");
    std::fs::create_dir(&queue_dir).unwrap();

    let adapter = FileAdapter::new(tmp.path());
    assert!(adapter.exists(&QueueName::new("jobs")).await.unwrap());
    assert!(!adapter.exists(&QueueName::new("missing")).await.unwrap());
    assert!(!adapter.has_work(&QueueName::new("jobs")).await.unwrap());

    std::fs::write(queue_dir.join("msg-1"), b"hello").unwrap();
    assert!(adapter.has_work(&QueueName::new("jobs")).await.unwrap());
}

#[tokio::test]
async fn responder_writes_a_report_file_per_message() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir(tmp.path().join("jobs")).unwrap();

    let adapter = FileAdapter::new(tmp.path());
    let sender = adapter.responder(&QueueName::new("jobs"), None).await.unwrap();
    sender
        .send(Report::progress(
            "host",
            "unique-1",
            "exp",
            0,
            qrunner_core::ProgressState::Started,
            None,
        ))
        .await
        .unwrap();
    drop(sender);

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let responses_dir = tmp.path().join("jobs").join(RESPONSES_DIR);
    assert!(responses_dir.join("unique-1.report").exists());
}

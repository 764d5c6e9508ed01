// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::report::ProgressState;

fn task() -> QueueTask {
    QueueTask::new(
        ServerId::new("server-a"),
        QueueName::new("jobs"),
        "jobs",
        CredentialHandle::new("cred"),
        b"payload".to_vec(),
    )
}

#[test]
fn try_send_report_without_sender_is_a_no_op() {
    let t = task();
    t.try_send_report(Report::progress("h", "h-1", "exp", 0, ProgressState::Started, None));
}

#[tokio::test]
async fn try_send_report_delivers_through_channel() {
    let (tx, mut rx) = mpsc::channel(1);
    let t = task().with_response_sender(tx);
    t.try_send_report(Report::progress("h", "h-1", "exp", 0, ProgressState::Started, None));
    let received = rx.recv().await.unwrap();
    assert_eq!(received.experiment_id, "exp");
}

#[tokio::test]
async fn try_send_report_drops_silently_when_channel_is_full() {
    let (tx, _rx) = mpsc::channel(1);
    tx.try_send(Report::progress("h", "h-1", "exp", 0, ProgressState::Started, None))
        .unwrap();
    let t = task().with_response_sender(tx);
    // Channel is full; this must not panic or block.
    t.try_send_report(Report::progress("h", "h-2", "exp", 1, ProgressState::Success, None));
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn reads_a_recognized_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lifecycle");
    std::fs::write(&path, "STATE=Running\n").unwrap();
    assert_eq!(read_state(&path).unwrap(), LifecycleState::Running);
}

#[test]
fn rejects_an_unrecognized_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lifecycle");
    std::fs::write(&path, "STATE=Paused\n").unwrap();
    assert!(read_state(&path).is_err());
}

#[test]
fn rejects_a_file_with_no_state_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lifecycle");
    std::fs::write(&path, "some other content\n").unwrap();
    assert!(read_state(&path).is_err());
}

#[tokio::test(start_paused = true)]
async fn publishes_once_on_change_and_stops_on_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lifecycle");
    std::fs::write(&path, "STATE=Running\n").unwrap();

    let broadcaster = Arc::new(LifecycleBroadcaster::new());
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(run_file_poller(path, broadcaster.clone(), cancel.clone()));

    tokio::task::yield_now().await;
    assert_eq!(broadcaster.current(), LifecycleState::Running);

    cancel.cancel();
    handle.await.unwrap();
}

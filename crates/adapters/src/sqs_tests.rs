// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn location_for_unknown_queue_is_permanent_error() {
    let adapter = SqsAdapter::new("/tmp/does-not-matter");
    let err = adapter.location_for(&QueueName::new("missing")).unwrap_err();
    assert!(matches!(err, AdapterError::Permanent { .. }));
}

#[tokio::test]
async fn has_work_always_reports_true() {
    let adapter = SqsAdapter::new("/tmp/does-not-matter");
    assert!(adapter.has_work(&QueueName::new("anything")).await.unwrap());
}

#[test]
fn intervals_match_spec_defaults() {
    let adapter = SqsAdapter::new("/tmp/does-not-matter");
    assert_eq!(adapter.refresh_interval(), Duration::from_secs(60));
    assert_eq!(adapter.work_check_interval(), Duration::from_secs(5));
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn amqp_discovery_always_reports_the_configured_url() {
    let discovery = AmqpDiscovery::new("amqp://localhost:5672/%2f");
    let servers = discovery.discover().await.unwrap();
    assert_eq!(servers, vec![ServerId::new("amqp://localhost:5672/%2f")]);
}

#[tokio::test]
async fn sqs_discovery_fails_when_credentials_root_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let discovery = SqsDiscovery::new(dir.path());
    assert!(discovery.discover().await.is_err());
}

#[tokio::test]
async fn sqs_discovery_reports_one_logical_server_when_a_region_is_present() {
    let dir = tempfile::tempdir().unwrap();
    let region_dir = dir.path().join("us-east-1");
    std::fs::create_dir_all(&region_dir).unwrap();
    std::fs::write(region_dir.join("region"), "us-east-1").unwrap();
    std::fs::write(region_dir.join("credentials"), "AKIA\nsecret").unwrap();

    let discovery = SqsDiscovery::new(dir.path());
    let servers = discovery.discover().await.unwrap();
    assert_eq!(servers.len(), 1);
}

#[tokio::test]
async fn file_discovery_fails_when_root_does_not_exist() {
    let discovery = FileDiscovery::new("/no/such/path/qrunner-test");
    assert!(discovery.discover().await.is_err());
}

#[tokio::test]
async fn file_discovery_reports_one_logical_server_when_root_exists() {
    let dir = tempfile::tempdir().unwrap();
    let discovery = FileDiscovery::new(dir.path());
    let servers = discovery.discover().await.unwrap();
    assert_eq!(servers.len(), 1);
}

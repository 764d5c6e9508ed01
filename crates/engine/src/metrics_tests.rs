// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn encode_includes_registered_metric_names() {
    let metrics = Metrics::new();
    let encoded = metrics.encode();
    assert!(encoded.contains("qrunner_tasks_running"));
    assert!(encoded.contains("qrunner_experiments_started_total"));
}

#[test]
fn experiment_labels_are_distinguished_by_experiment_id() {
    let metrics = Metrics::new();
    let a = ExperimentLabels {
        host: "h1".into(),
        queue_type: QueueType::Amqp,
        queue_name: "q".into(),
        project: "p".into(),
        experiment: "exp-a".into(),
    };
    let b = ExperimentLabels {
        experiment: "exp-b".into(),
        ..a.clone()
    };
    metrics.experiments_started.get_or_create(&a).inc();
    metrics.experiments_started.get_or_create(&b).inc();
    assert_eq!(metrics.experiments_started.get_or_create(&a).get(), 1);
    assert_eq!(metrics.experiments_started.get_or_create(&b).get(), 1);
}

#[test]
fn running_gauge_tracks_inc_dec() {
    let metrics = Metrics::new();
    metrics.tasks_running.inc();
    metrics.tasks_running.inc();
    assert_eq!(metrics.tasks_running.get(), 2);
    metrics.tasks_running.dec();
    assert_eq!(metrics.tasks_running.get(), 1);
}

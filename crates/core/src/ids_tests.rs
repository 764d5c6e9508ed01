// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn server_scoped_key_joins_server_and_queue() {
    let server = ServerId::new("amqp://broker.local");
    let queue = QueueName::new("rmq_test");
    assert_eq!(server.scoped(&queue), "amqp://broker.local/rmq_test");
}

#[test]
fn ids_are_distinguishable_by_type_despite_equal_strings() {
    let server = ServerId::new("x");
    let queue = QueueName::new("x");
    assert_eq!(server.as_str(), queue.as_str());
}

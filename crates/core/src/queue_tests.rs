// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fq_name_joins_server_and_queue() {
    let d = QueueDescriptor::new(
        ServerId::new("broker-a"),
        QueueName::new("jobs"),
        CredentialHandle::new("cred-1"),
    );
    assert_eq!(d.fq_name(), "broker-a/jobs");
}

#[test]
fn equality_ignores_nothing() {
    let a = QueueDescriptor::new(
        ServerId::new("s"),
        QueueName::new("q"),
        CredentialHandle::new("c1"),
    );
    let b = QueueDescriptor::new(
        ServerId::new("s"),
        QueueName::new("q"),
        CredentialHandle::new("c2"),
    );
    assert_ne!(a, b, "differing credential handle makes descriptors unequal");
}

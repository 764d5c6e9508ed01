// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io;

#[test]
fn transient_and_resource_errors_nack() {
    let e = CoreError::TransientQueue {
        project: "p".into(),
        queue: "q".into(),
        source: Box::new(io::Error::other("down")),
    };
    assert_eq!(e.disposition(), Disposition::Nack);

    let e = CoreError::ResourceExhausted {
        project: "p".into(),
        queue: "q".into(),
        dimension: "cpu".into(),
    };
    assert_eq!(e.disposition(), Disposition::Nack);
}

#[test]
fn permanent_and_validation_errors_ack() {
    let e = CoreError::PermanentQueue {
        project: "p".into(),
        queue: "q".into(),
    };
    assert_eq!(e.disposition(), Disposition::Ack);

    let e = CoreError::PayloadValidation {
        experiment: "exp".into(),
        reason: "bad schema".into(),
    };
    assert_eq!(e.disposition(), Disposition::Ack);
}

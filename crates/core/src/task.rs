// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Queue task (spec.md §3): a single dequeued message plus its
//! processing context.

use crate::ids::{CredentialHandle, QueueName, ServerId};
use crate::report::Report;
use tokio::sync::mpsc;

/// A message handed from a `QueueAdapter` to the Message Handler (C10).
/// The payload is opaque bytes — the engine never parses it, only the
/// injected Processor does.
pub struct QueueTask {
    pub project: ServerId,
    pub queue: QueueName,
    pub short_queue_name: String,
    pub credential: CredentialHandle,
    pub payload: Vec<u8>,
    pub response_sender: Option<mpsc::Sender<Report>>,
}

impl QueueTask {
    pub fn new(
        project: ServerId,
        queue: QueueName,
        short_queue_name: impl Into<String>,
        credential: CredentialHandle,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            project,
            queue,
            short_queue_name: short_queue_name.into(),
            credential,
            payload,
            response_sender: None,
        }
    }

    pub fn with_response_sender(mut self, sender: mpsc::Sender<Report>) -> Self {
        self.response_sender = Some(sender);
        self
    }

    /// Emit a report on the response channel, dropping it silently if the
    /// channel is full or has no sender — backpressure here is
    /// informational, never a reason to fail the experiment (spec.md
    /// §4.10 step 3).
    pub fn try_send_report(&self, report: Report) {
        if let Some(sender) = &self.response_sender {
            let _ = sender.try_send(report);
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;

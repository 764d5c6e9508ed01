// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stub `ProcessorFactory`/`Processor` (spec.md §1, §4.10): the real
//! experiment executor — unpacking artifacts, running the user payload,
//! uploading results — is named as an external collaborator the core
//! never depends on directly. This is the minimal implementation that
//! satisfies the interface so the daemon runs end to end: it parses a
//! JSON task payload for the fields the core needs (an experiment id and
//! a resource request) and immediately reports success, observing the
//! requested envelope back to the ledger.

use async_trait::async_trait;
use qrunner_core::{CoreError, QueueTask, ResourceEnvelope};
use qrunner_engine::{ParsedTask, ProcessOutcome, Processor, ProcessorFactory};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

/// The schema this stub understands: a JSON object naming the experiment
/// and, optionally, the resources it needs. A real Executor's payload
/// schema is a concern of the executor, not this core.
#[derive(Debug, Deserialize)]
struct TaskPayload {
    experiment_id: String,
    #[serde(default)]
    cpu: u32,
    #[serde(default)]
    ram_bytes: u64,
    #[serde(default)]
    disk_bytes: u64,
}

/// Reports success with the parsed resource envelope and does no actual
/// work. Stands in for the (external) Executor.
struct NoopProcessor {
    resources: ResourceEnvelope,
}

#[async_trait]
impl Processor for NoopProcessor {
    async fn process(&self, _cancel: CancellationToken) -> ProcessOutcome {
        ProcessOutcome::success(Some(self.resources))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StubProcessorFactory;

#[async_trait]
impl ProcessorFactory for StubProcessorFactory {
    async fn create(&self, task: &QueueTask, allow_cleartext: bool) -> Result<ParsedTask, CoreError> {
        let text = std::str::from_utf8(&task.payload).map_err(|_| CoreError::PayloadValidation {
            experiment: "unknown".to_string(),
            reason: "payload is not valid UTF-8 cleartext; decryption is not implemented by this stub".to_string(),
        })?;

        if !allow_cleartext {
            return Err(CoreError::PayloadValidation {
                experiment: "unknown".to_string(),
                reason: "cleartext messages are not permitted".to_string(),
            });
        }

        let parsed: TaskPayload = serde_json::from_str(text).map_err(|e| CoreError::PayloadValidation {
            experiment: "unknown".to_string(),
            reason: format!("invalid task payload: {e}"),
        })?;

        let resources = ResourceEnvelope {
            cpu: parsed.cpu.max(1),
            ram_bytes: parsed.ram_bytes,
            disk_bytes: parsed.disk_bytes,
            ..ResourceEnvelope::default()
        };

        Ok(ParsedTask {
            experiment_id: parsed.experiment_id,
            processor: Box::new(NoopProcessor { resources }),
        })
    }
}

#[cfg(test)]
#[path = "processor_tests.rs"]
mod tests;

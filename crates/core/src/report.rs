// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Report` wire type published to the response queue (spec.md §6).
//!
//! Encoded with `prost` directly against hand-written field attributes
//! (no `.proto` file / `protoc` build step — the message shape is small
//! and stable enough that a `::prost::Message` derive is simpler than
//! wiring a code-gen build script for it).

use prost::Message;

/// One report emitted onto a queue's response channel.
#[derive(Clone, PartialEq, Message)]
pub struct Report {
    /// Milliseconds since the Unix epoch.
    #[prost(uint64, tag = "1")]
    pub timestamp_ms: u64,
    /// Hostname of the worker process that produced this report.
    #[prost(string, tag = "2")]
    pub executor_id: String,
    /// `{host}-{time-encoded suffix}`, unique per report.
    #[prost(string, tag = "3")]
    pub unique_id: String,
    /// The experiment this report concerns.
    #[prost(string, tag = "4")]
    pub experiment_id: String,
    #[prost(oneof = "ReportPayload", tags = "5")]
    pub payload: Option<ReportPayload>,
}

#[derive(Clone, PartialEq, ::prost::Oneof)]
pub enum ReportPayload {
    #[prost(message, tag = "5")]
    Progress(Progress),
}

#[derive(Clone, PartialEq, Message)]
pub struct Progress {
    #[prost(enumeration = "ProgressState", tag = "1")]
    pub state: i32,
    #[prost(string, optional, tag = "2")]
    pub error: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq, ::prost::Enumeration)]
#[repr(i32)]
pub enum ProgressState {
    Started = 0,
    Success = 1,
    Failed = 2,
}

impl Report {
    pub fn progress(
        executor_id: impl Into<String>,
        unique_id: impl Into<String>,
        experiment_id: impl Into<String>,
        timestamp_ms: u64,
        state: ProgressState,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp_ms,
            executor_id: executor_id.into(),
            unique_id: unique_id.into(),
            experiment_id: experiment_id.into(),
            payload: Some(ReportPayload::Progress(Progress {
                state: state as i32,
                error,
            })),
        }
    }
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! qrunner-engine: the orchestration components (spec.md §4) that turn a
//! `qrunner_adapters::QueueAdapter` into dispatched, resource-bounded
//! work. Nothing here talks to a real broker, cloud API, or filesystem —
//! that lives in `qrunner_adapters` and is injected.

pub mod backend_service;
pub mod backoff;
pub mod busy;
pub mod error;
pub mod handler;
pub mod ledger;
pub mod lifecycle;
pub mod limiter;
pub mod metrics;
pub mod queuer;
pub mod servers;
pub mod subscriptions;

pub use backend_service::{BackendService, DiscoveryError, DispatchRule, ServerDiscovery};
pub use backoff::{ttl, BackoffRegistry};
pub use busy::{BusyGuard, BusyRegistry};
pub use error::EngineError;
pub use handler::{MessageHandler, ParsedTask, ProcessOutcome, Processor, ProcessorFactory, SystemWallClock, WallClock};
pub use ledger::{Allocation, GpuCard, GpuGrant, ResourceLedger};
pub use lifecycle::LifecycleBroadcaster;
pub use limiter::{Limiter, LimiterConfig, NoNewTasksFlag, MINIMUM_LIMIT_INTERVAL};
pub use metrics::{BackendLabels, ExperimentLabels, Metrics, QueueType};
pub use queuer::Queuer;
pub use servers::{OpenForBusiness, ServersRegistry};
pub use subscriptions::{AlignDelta, SubscriptionTable};

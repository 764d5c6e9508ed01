// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `qrunnerd`: the distributed compute-job queue runner binary. Parses
//! CLI flags into the wiring spec.md's §4 components describe, runs
//! until the process context is cancelled (Limiter-triggered shutdown,
//! or SIGTERM/SIGINT), and exits 0.

mod cli;
mod discovery;
mod lifecycle_source;
mod metrics_server;
mod processor;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use qrunner_adapters::{AmqpAdapter, EncryptionKeyStore, FileAdapter, SqsAdapter, TaskHandler};
use qrunner_core::{parse_bytes, ServerId, SystemClock, UuidIdGen};
use qrunner_engine::{
    BackendService, BackoffRegistry, BusyRegistry, DispatchRule, LifecycleBroadcaster, Limiter,
    LimiterConfig, MessageHandler, Metrics, NoNewTasksFlag, OpenForBusiness, QueueType,
    ResourceLedger, ServersRegistry, SystemWallClock,
};
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use cli::{Cli, LogFormat};
use discovery::{AmqpDiscovery, FileDiscovery, SqsDiscovery};
use processor::StubProcessorFactory;

const AMQP_SERVICE_INTERVAL: Duration = Duration::from_secs(15);
const SQS_SERVICE_INTERVAL: Duration = Duration::from_secs(15);
const FILE_SERVICE_INTERVAL: Duration = Duration::from_secs(3);

fn init_logging(cli: &Cli) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    match cli.log_format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "qrunner-unknown-host".to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    if cli.amqp_url.is_none() && cli.sqs_certs.is_none() && cli.queue_root.is_none() {
        error!("no queue source configured: pass at least one of --amqp-url, --sqs-certs, --queue-root");
        return ExitCode::FAILURE;
    }

    let max_mem = match parse_bytes(&cli.max_mem) {
        Ok(v) => v,
        Err(err) => {
            error!(error = %err, "invalid --max-mem");
            return ExitCode::FAILURE;
        }
    };
    let max_disk = match parse_bytes(&cli.max_disk) {
        Ok(v) => v,
        Err(err) => {
            error!(error = %err, "invalid --max-disk");
            return ExitCode::FAILURE;
        }
    };
    let name_match = match Regex::new(&cli.queue_match) {
        Ok(re) => re,
        Err(err) => {
            error!(error = %err, "invalid --queue-match");
            return ExitCode::FAILURE;
        }
    };
    let name_mismatch = match Regex::new(&cli.queue_mismatch) {
        Ok(re) => re,
        Err(err) => {
            error!(error = %err, "invalid --queue-mismatch");
            return ExitCode::FAILURE;
        }
    };

    let (limiter_config, interval_clamped) = LimiterConfig {
        max_tasks: cli.limit_tasks,
        max_idle: cli.limit_idle_duration,
        limit_interval: cli.limit_interval,
    }
    .clamped();
    if interval_clamped {
        warn!(
            floor_secs = qrunner_engine::MINIMUM_LIMIT_INTERVAL.as_secs(),
            "--limit-interval below the floor, clamped"
        );
    }

    let host = hostname();
    let clock = SystemClock;
    let backoff = Arc::new(BackoffRegistry::new(clock.clone()));
    let busy = Arc::new(BusyRegistry::new());
    let ledger = Arc::new(ResourceLedger::new(cli.max_cores, max_mem, max_disk, Vec::new()));
    let metrics = Arc::new(Metrics::new());
    let lifecycle = Arc::new(LifecycleBroadcaster::new());
    let no_new_tasks = NoNewTasksFlag::new();
    let factory = Arc::new(StubProcessorFactory);
    let encrypt_keys = cli.encrypt_dir.clone().map(|dir| Arc::new(EncryptionKeyStore::new(dir)));

    let root = CancellationToken::new();
    let mut tasks = Vec::new();
    let mut registries: Vec<Arc<dyn OpenForBusiness>> = Vec::new();

    tasks.push(tokio::spawn(lifecycle.clone().run_repeater(root.child_token())));
    if let Some(path) = cli.lifecycle_file.clone() {
        tasks.push(tokio::spawn(lifecycle_source::run_file_poller(
            path,
            lifecycle.clone(),
            root.child_token(),
        )));
    }

    if let Some(amqp_url) = cli.amqp_url.clone() {
        let management_url = cli
            .amqp_management_url
            .clone()
            .unwrap_or_else(|| default_amqp_management_url(&amqp_url));
        let vhost = cli.amqp_vhost.clone();
        let handler: Arc<dyn TaskHandler> = Arc::new(MessageHandler::new(
            factory.clone(),
            metrics.clone(),
            SystemWallClock,
            UuidIdGen,
            host.clone(),
            cli.clear_text_messages,
            QueueType::Amqp,
        ));
        let registry = Arc::new(ServersRegistry::new(
            {
                let amqp_url = amqp_url.clone();
                let management_url = management_url.clone();
                let vhost = vhost.clone();
                move |_server: &ServerId| AmqpAdapter::new(amqp_url.clone(), management_url.clone(), vhost.clone())
            },
            clock.clone(),
            backoff.clone(),
            busy.clone(),
            ledger.clone(),
            handler,
            name_match.clone(),
            name_mismatch.clone(),
            encrypt_keys.clone(),
        ));
        registries.push(registry.clone());
        let service = Arc::new(BackendService::new(
            QueueType::Amqp,
            AmqpDiscovery::new(&amqp_url),
            registry,
            lifecycle.clone(),
            metrics.clone(),
            AMQP_SERVICE_INTERVAL,
            DispatchRule::Strict,
        ));
        tasks.push(tokio::spawn(service.run(root.child_token())));
        info!(%amqp_url, "amqp backend configured");
    }

    if let Some(sqs_certs) = cli.sqs_certs.clone() {
        let handler: Arc<dyn TaskHandler> = Arc::new(MessageHandler::new(
            factory.clone(),
            metrics.clone(),
            SystemWallClock,
            UuidIdGen,
            host.clone(),
            cli.clear_text_messages,
            QueueType::Sqs,
        ));
        let registry = Arc::new(ServersRegistry::new(
            {
                let sqs_certs = sqs_certs.clone();
                move |_server: &ServerId| SqsAdapter::new(sqs_certs.clone())
            },
            clock.clone(),
            backoff.clone(),
            busy.clone(),
            ledger.clone(),
            handler,
            name_match.clone(),
            name_mismatch.clone(),
            encrypt_keys.clone(),
        ));
        registries.push(registry.clone());
        let service = Arc::new(BackendService::new(
            QueueType::Sqs,
            SqsDiscovery::new(sqs_certs.clone()),
            registry,
            lifecycle.clone(),
            metrics.clone(),
            SQS_SERVICE_INTERVAL,
            DispatchRule::CloudTolerant,
        ));
        tasks.push(tokio::spawn(service.run(root.child_token())));
        info!(path = %sqs_certs.display(), "sqs backend configured");
    }

    if let Some(queue_root) = cli.queue_root.clone() {
        let handler: Arc<dyn TaskHandler> = Arc::new(MessageHandler::new(
            factory.clone(),
            metrics.clone(),
            SystemWallClock,
            UuidIdGen,
            host.clone(),
            cli.clear_text_messages,
            QueueType::File,
        ));
        let registry = Arc::new(ServersRegistry::new(
            {
                let queue_root = queue_root.clone();
                move |_server: &ServerId| FileAdapter::new(queue_root.clone())
            },
            clock.clone(),
            backoff.clone(),
            busy.clone(),
            ledger.clone(),
            handler,
            name_match.clone(),
            name_mismatch.clone(),
            encrypt_keys.clone(),
        ));
        registries.push(registry.clone());
        let service = Arc::new(BackendService::new(
            QueueType::File,
            FileDiscovery::new(queue_root.clone()),
            registry,
            lifecycle.clone(),
            metrics.clone(),
            FILE_SERVICE_INTERVAL,
            DispatchRule::CloudTolerant,
        ));
        tasks.push(tokio::spawn(service.run(root.child_token())));
        info!(path = %queue_root.display(), "file backend configured");
    }

    if let Some(addr) = cli.prom_address {
        let metrics = metrics.clone();
        let cancel = root.child_token();
        tasks.push(tokio::spawn(async move {
            if let Err(err) = metrics_server::run(addr, metrics, cancel).await {
                error!(error = %err, "metrics endpoint failed");
            }
        }));
    }

    let limiter = Arc::new(Limiter::new(clock.clone(), limiter_config, metrics.clone(), no_new_tasks.clone()));
    tasks.push(tokio::spawn(limiter.run(root.child_token())));
    tasks.push(tokio::spawn(no_new_tasks.run_propagator(registries, root.child_token())));

    tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown signal received");
            root.cancel();
        }
        () = root.cancelled() => {}
    }

    for task in tasks {
        let _ = task.await;
    }

    ExitCode::SUCCESS
}

fn default_amqp_management_url(amqp_url: &str) -> String {
    let host = amqp_url
        .split("://")
        .nth(1)
        .and_then(|rest| rest.split(['@', '/']).find(|s| !s.is_empty() && !s.contains(':')))
        .unwrap_or("localhost");
    format!("http://{host}:15672")
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(err) => {
            error!(error = %err, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
            unreachable!()
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(err) => {
            error!(error = %err, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
            unreachable!()
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-line surface (spec.md §6, expanded in SPEC_FULL.md §6): every
//! flag is a queue-source root, a resource ceiling, a liveness limit, a
//! security option, or an ambient concern (logging, metrics).

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "qrunnerd", version, about = "Distributed compute-job queue runner")]
pub struct Cli {
    /// AMQP broker URL. At least one of --amqp-url, --sqs-certs,
    /// --queue-root must be set.
    #[arg(long)]
    pub amqp_url: Option<String>,

    /// AMQP management-API URL (defaults to the broker URL's host on port
    /// 15672 when omitted).
    #[arg(long)]
    pub amqp_management_url: Option<String>,

    /// AMQP virtual host.
    #[arg(long, default_value = "/")]
    pub amqp_vhost: String,

    /// Directory of per-region SQS credential subdirectories.
    #[arg(long)]
    pub sqs_certs: Option<PathBuf>,

    /// Root directory of file-backed queues.
    #[arg(long)]
    pub queue_root: Option<PathBuf>,

    /// Positive queue-name filter.
    #[arg(long, default_value = ".*")]
    pub queue_match: String,

    /// Negative queue-name filter.
    #[arg(long, default_value = "^$")]
    pub queue_mismatch: String,

    /// CPU cores available to this node.
    #[arg(long, default_value_t = 4)]
    pub max_cores: u32,

    /// RAM ceiling, human-readable (e.g. "16GiB").
    #[arg(long, default_value = "0")]
    pub max_mem: String,

    /// Disk ceiling, human-readable (e.g. "100GiB").
    #[arg(long, default_value = "0")]
    pub max_disk: String,

    /// Shut down once running+completed reaches this many tasks and no
    /// task is running. Unset means unlimited.
    #[arg(long)]
    pub limit_tasks: Option<u64>,

    /// Shut down once idle (no running task) for longer than this,
    /// human-readable (e.g. "2m", "90s").
    #[arg(long, value_parser = parse_duration)]
    pub limit_idle_duration: Option<std::time::Duration>,

    /// How often the Limiter polls its counters. Clamped to a 5-minute
    /// floor with a startup warning.
    #[arg(long, default_value = "5m", value_parser = parse_duration)]
    pub limit_interval: std::time::Duration,

    /// Directory of per-queue response-encryption public keys.
    #[arg(long)]
    pub encrypt_dir: Option<PathBuf>,

    /// Permit processing unencrypted messages (normally rejected).
    #[arg(long, default_value_t = false)]
    pub clear_text_messages: bool,

    /// Address the Prometheus metrics endpoint listens on, e.g.
    /// "0.0.0.0:9090". Unset disables the endpoint.
    #[arg(long)]
    pub prom_address: Option<std::net::SocketAddr>,

    /// Poll this file's `STATE` line (Running/DrainAndSuspend/Unknown)
    /// instead of watching a cluster config map.
    #[arg(long)]
    pub lifecycle_file: Option<PathBuf>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Log level filter (passed to `tracing_subscriber::EnvFilter` when
    /// `RUST_LOG` is unset).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

fn parse_duration(s: &str) -> Result<std::time::Duration, String> {
    let s = s.trim();
    let split_at = s
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
        .map(|(i, _)| i)
        .ok_or_else(|| format!("missing time unit in duration {s:?}"))?;
    let (num_str, unit) = s.split_at(split_at);
    let num: f64 = num_str.parse().map_err(|_| format!("invalid number in duration {s:?}"))?;
    let seconds = match unit {
        "ms" => num / 1000.0,
        "s" => num,
        "m" => num * 60.0,
        "h" => num * 3600.0,
        other => return Err(format!("unknown duration unit {other:?}")),
    };
    Ok(std::time::Duration::from_secs_f64(seconds))
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;

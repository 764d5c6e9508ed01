// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parses_seconds_and_minutes() {
    assert_eq!(parse_duration("90s").unwrap(), std::time::Duration::from_secs(90));
    assert_eq!(parse_duration("2m").unwrap(), std::time::Duration::from_secs(120));
    assert_eq!(parse_duration("1.5h").unwrap(), std::time::Duration::from_secs(5400));
}

#[test]
fn rejects_missing_unit() {
    assert!(parse_duration("90").is_err());
}

#[test]
fn rejects_unknown_unit() {
    assert!(parse_duration("90x").is_err());
}

#[test]
fn defaults_are_sane() {
    let cli = Cli::parse_from(["qrunnerd", "--amqp-url", "amqp://localhost"]);
    assert_eq!(cli.max_cores, 4);
    assert_eq!(cli.amqp_vhost, "/");
    assert_eq!(cli.limit_interval, std::time::Duration::from_secs(300));
    assert!(!cli.clear_text_messages);
    assert_eq!(cli.log_format, LogFormat::Pretty);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Feeds the Lifecycle Broadcaster (C1) from `--lifecycle-file` (spec.md
//! §6): a file whose first `STATE=...` line is polled and parsed on a
//! fixed interval. A cluster config-map watcher would plug in at the
//! same seam; this is the file-backed form the CLI actually exposes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use qrunner_core::LifecycleState;
use qrunner_engine::LifecycleBroadcaster;
use tokio_util::sync::CancellationToken;
use tracing::warn;

const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Reads and parses a single `STATE=...` line out of `path`. Any I/O or
/// parse failure is reported to the caller rather than silently treated
/// as `Unknown`, so a misconfigured path surfaces in the logs.
fn read_state(path: &Path) -> Result<LifecycleState, String> {
    let contents = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let line = contents
        .lines()
        .find_map(|l| l.trim().strip_prefix("STATE="))
        .ok_or_else(|| format!("{} has no STATE= line", path.display()))?;
    LifecycleState::parse(line.trim()).ok_or_else(|| format!("unrecognized lifecycle state {line:?}"))
}

/// Polls `path` until `cancel` fires, publishing every state change (and
/// re-publishing unchanged state periodically via the broadcaster's own
/// repeater).
pub async fn run_file_poller(
    path: PathBuf,
    broadcaster: Arc<LifecycleBroadcaster>,
    cancel: CancellationToken,
) {
    loop {
        match read_state(&path) {
            Ok(state) => {
                if state != broadcaster.current() {
                    broadcaster.publish(state).await;
                }
            }
            Err(err) => warn!(path = %path.display(), error = %err, "lifecycle file unreadable, leaving state unchanged"),
        }

        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = cancel.cancelled() => return,
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_source_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed `QueueAdapter` (spec.md §6): each queue is a directory
//! under the configured root; messages are files moved between the
//! directory, a `.inflight/` subdirectory, and deleted/restored on
//! ack/nack. `has_work` is a plain directory scan for the oldest
//! remaining file — cheap enough at the queue sizes this backend targets
//! that a filesystem watch isn't worth the extra moving part.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use prost::Message as _;
use qrunner_core::{CredentialHandle, QueueName, QueueTask, Report, ServerId};
use regex::Regex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::adapter::{QueueAdapter, TaskHandler, WorkOutcome};
use crate::error::AdapterError;

const INFLIGHT_DIR: &str = ".inflight";
const RESPONSES_DIR: &str = ".responses";

#[derive(Clone)]
pub struct FileAdapter {
    root: PathBuf,
}

impl FileAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn queue_dir(&self, queue: &QueueName) -> PathBuf {
        self.root.join(queue.as_str())
    }

    async fn next_message_path(dir: &Path) -> Result<Option<PathBuf>, std::io::Error> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if !file_type.is_file() {
                continue;
            }
            names.push(entry.path());
        }
        names.sort();
        Ok(names.into_iter().next())
    }
}

#[async_trait]
impl QueueAdapter for FileAdapter {
    async fn refresh(
        &self,
        name_match: &Regex,
        name_mismatch: &Regex,
    ) -> Result<HashMap<QueueName, CredentialHandle>, AdapterError> {
        let mut out = HashMap::new();
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| AdapterError::transient(self.root.to_string_lossy(), "", e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AdapterError::transient(self.root.to_string_lossy(), "", e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| AdapterError::transient(self.root.to_string_lossy(), "", e))?;
            if !file_type.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !name_match.is_match(&name) || name_mismatch.is_match(&name) {
                continue;
            }
            out.insert(
                QueueName::new(name.clone()),
                CredentialHandle::new(entry.path().to_string_lossy().into_owned()),
            );
        }
        Ok(out)
    }

    async fn work(
        &self,
        queue: &QueueName,
        _credential: &CredentialHandle,
        handler: &(dyn TaskHandler),
        cancel: CancellationToken,
    ) -> Result<WorkOutcome, AdapterError> {
        let dir = self.queue_dir(queue);
        let inflight_dir = dir.join(INFLIGHT_DIR);
        tokio::fs::create_dir_all(&inflight_dir)
            .await
            .map_err(|e| AdapterError::transient(queue.as_str(), "", e))?;

        let Some(message_path) = Self::next_message_path(&dir)
            .await
            .map_err(|e| AdapterError::transient(queue.as_str(), "", e))?
        else {
            return Ok(WorkOutcome::NoMessage);
        };
        let file_name = message_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let inflight_path = inflight_dir.join(&file_name);
        tokio::fs::rename(&message_path, &inflight_path)
            .await
            .map_err(|e| AdapterError::transient(queue.as_str(), &file_name, e))?;

        let payload = tokio::fs::read(&inflight_path)
            .await
            .map_err(|e| AdapterError::transient(queue.as_str(), &file_name, e))?;

        let task = QueueTask::new(
            ServerId::new(self.root.to_string_lossy().into_owned()),
            queue.clone(),
            self.short_queue_name(queue),
            CredentialHandle::new(file_name.clone()),
            payload,
        );

        let outcome = handler.handle(task, cancel.clone()).await;

        match outcome.disposition {
            qrunner_core::Disposition::Ack => {
                tokio::fs::remove_file(&inflight_path)
                    .await
                    .map_err(|e| AdapterError::transient(queue.as_str(), &file_name, e))?;
            }
            qrunner_core::Disposition::Nack => {
                tokio::fs::rename(&inflight_path, dir.join(&file_name))
                    .await
                    .map_err(|e| AdapterError::transient(queue.as_str(), &file_name, e))?;
            }
        }
        Ok(WorkOutcome::Processed)
    }

    async fn exists(&self, queue: &QueueName) -> Result<bool, AdapterError> {
        Ok(self.queue_dir(queue).is_dir())
    }

    async fn has_work(&self, queue: &QueueName) -> Result<bool, AdapterError> {
        let dir = self.queue_dir(queue);
        match Self::next_message_path(&dir).await {
            Ok(found) => Ok(found.is_some()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AdapterError::transient(queue.as_str(), "", e)),
        }
    }

    async fn responder(
        &self,
        queue: &QueueName,
        public_key: Option<&[u8]>,
    ) -> Result<mpsc::Sender<Report>, AdapterError> {
        let responses_dir = self.queue_dir(queue).join(RESPONSES_DIR);
        tokio::fs::create_dir_all(&responses_dir)
            .await
            .map_err(|e| AdapterError::transient(queue.as_str(), "", e))?;

        let (tx, mut rx) = mpsc::channel::<Report>(64);
        let public_key = public_key.map(|k| k.to_vec());
        tokio::spawn(async move {
            while let Some(report) = rx.recv().await {
                let bytes = report.encode_to_vec();
                let payload = match &public_key {
                    Some(key) => match crate::crypto::seal(&bytes, key) {
                        Ok(sealed) => sealed,
                        Err(e) => {
                            warn!(error = %e, "failed to seal report, dropping");
                            continue;
                        }
                    },
                    None => bytes,
                };
                let path = responses_dir.join(format!("{}.report", report.unique_id));
                if let Err(e) = tokio::fs::write(&path, &payload).await {
                    warn!(error = %e, path = %path.display(), "failed to write report file");
                }
            }
        });
        Ok(tx)
    }

    fn short_queue_name(&self, queue: &QueueName) -> String {
        queue.as_str().to_string()
    }

    fn refresh_interval(&self) -> Duration {
        Duration::from_secs(10)
    }

    fn work_check_interval(&self) -> Duration {
        Duration::from_secs(2)
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;

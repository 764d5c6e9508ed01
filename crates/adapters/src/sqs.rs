// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SQS `QueueAdapter` (spec.md §6): `aws-sdk-sqs` + `aws-config` for
//! region-scoped clients built from the directory-of-pairs credential
//! store, one client cached per discovered region.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_sqs::config::Region;
use aws_sdk_sqs::Client;
use parking_lot::Mutex;
use prost::Message as _;
use qrunner_core::{CredentialHandle, QueueName, QueueTask, Report, ServerId};
use regex::Regex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::adapter::{HandlerOutcome, QueueAdapter, TaskHandler, WorkOutcome};
use crate::credentials::{self, RegionCredential};
use crate::error::AdapterError;

const VISIBILITY_TIMEOUT_SECS: i32 = 30;
const WAIT_TIME_SECS: i32 = 5;
const HEARTBEAT_FLOOR: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct QueueLocation {
    region: String,
    queue_url: String,
}

pub struct SqsAdapter {
    credentials_root: PathBuf,
    regions: Arc<Mutex<HashMap<String, RegionCredential>>>,
    queue_map: Arc<Mutex<HashMap<QueueName, QueueLocation>>>,
    clients: Arc<tokio::sync::Mutex<HashMap<String, Client>>>,
}

impl Clone for SqsAdapter {
    fn clone(&self) -> Self {
        Self {
            credentials_root: self.credentials_root.clone(),
            regions: self.regions.clone(),
            queue_map: self.queue_map.clone(),
            clients: self.clients.clone(),
        }
    }
}

impl SqsAdapter {
    pub fn new(credentials_root: impl Into<PathBuf>) -> Self {
        Self {
            credentials_root: credentials_root.into(),
            regions: Arc::new(Mutex::new(HashMap::new())),
            queue_map: Arc::new(Mutex::new(HashMap::new())),
            clients: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
        }
    }

    async fn client_for(&self, region: &str) -> Result<Client, AdapterError> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(region) {
            return Ok(client.clone());
        }

        let region_cred = self
            .regions
            .lock()
            .get(region)
            .cloned()
            .ok_or_else(|| AdapterError::BadCredential {
                server: region.to_string(),
                reason: "region not present in credential store".to_string(),
            })?;
        let (access_key, secret_key) = region_cred.load_keys().map_err(|e| AdapterError::BadCredential {
            server: region.to_string(),
            reason: e.to_string(),
        })?;

        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "qrunner-credential-store",
            ))
            .load()
            .await;
        let client = Client::new(&config);
        clients.insert(region.to_string(), client.clone());
        Ok(client)
    }

    fn location_for(&self, queue: &QueueName) -> Result<QueueLocation, AdapterError> {
        self.queue_map
            .lock()
            .get(queue)
            .cloned()
            .ok_or_else(|| AdapterError::Permanent {
                server: "sqs".to_string(),
                queue: queue.as_str().to_string(),
            })
    }
}

#[async_trait]
impl QueueAdapter for SqsAdapter {
    async fn refresh(
        &self,
        name_match: &Regex,
        name_mismatch: &Regex,
    ) -> Result<HashMap<QueueName, CredentialHandle>, AdapterError> {
        let region_creds =
            credentials::scan(&self.credentials_root).map_err(|e| AdapterError::BadCredential {
                server: self.credentials_root.to_string_lossy().into_owned(),
                reason: e.to_string(),
            })?;
        for rc in &region_creds {
            self.regions.lock().insert(rc.region.clone(), rc.clone());
        }

        let mut out = HashMap::new();
        for rc in &region_creds {
            let client = self.client_for(&rc.region).await?;
            let resp = client
                .list_queues()
                .send()
                .await
                .map_err(|e| AdapterError::transient(&rc.region, "", e))?;
            for url in resp.queue_urls() {
                let short_name = url.rsplit('/').next().unwrap_or(url).to_string();
                if !name_match.is_match(&short_name) || name_mismatch.is_match(&short_name) {
                    continue;
                }
                let queue = QueueName::new(short_name);
                self.queue_map.lock().insert(
                    queue.clone(),
                    QueueLocation {
                        region: rc.region.clone(),
                        queue_url: url.to_string(),
                    },
                );
                out.insert(
                    queue,
                    CredentialHandle::new(format!("{}|{}", rc.region, url)),
                );
            }
        }
        Ok(out)
    }

    async fn work(
        &self,
        queue: &QueueName,
        credential: &CredentialHandle,
        handler: &(dyn TaskHandler),
        cancel: CancellationToken,
    ) -> Result<WorkOutcome, AdapterError> {
        let (region, queue_url) =
            credential
                .as_str()
                .split_once('|')
                .ok_or_else(|| AdapterError::BadCredential {
                    server: "sqs".to_string(),
                    reason: "malformed credential handle".to_string(),
                })?;
        let client = self.client_for(region).await?;

        let resp = client
            .receive_message()
            .queue_url(queue_url)
            .visibility_timeout(VISIBILITY_TIMEOUT_SECS)
            .wait_time_seconds(WAIT_TIME_SECS)
            .max_number_of_messages(1)
            .send()
            .await
            .map_err(|e| AdapterError::transient(region, queue.as_str(), e))?;

        let Some(message) = resp.messages.unwrap_or_default().into_iter().next() else {
            return Ok(WorkOutcome::NoMessage);
        };
        let receipt_handle = message.receipt_handle.clone().unwrap_or_default();
        let body = message.body.unwrap_or_default();

        let task = QueueTask::new(
            ServerId::new(region.to_string()),
            queue.clone(),
            self.short_queue_name(queue),
            credential.clone(),
            body.into_bytes(),
        );

        let heartbeat_cancel = cancel.child_token();
        let heartbeat_handle = tokio::spawn({
            let client = client.clone();
            let queue_url = queue_url.to_string();
            let receipt_handle = receipt_handle.clone();
            let heartbeat_cancel = heartbeat_cancel.clone();
            async move {
                // First extension at half the visibility timeout, then
                // exponentially decreasing intervals floored at 5s
                // (spec.md §4.6).
                let mut interval = Duration::from_secs(VISIBILITY_TIMEOUT_SECS as u64 / 2);
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {
                            if let Err(e) = client
                                .change_message_visibility()
                                .queue_url(&queue_url)
                                .receipt_handle(&receipt_handle)
                                .visibility_timeout(VISIBILITY_TIMEOUT_SECS)
                                .send()
                                .await
                            {
                                warn!(error = %e, "failed to extend sqs visibility");
                            }
                            interval = (interval / 2).max(HEARTBEAT_FLOOR);
                        }
                        _ = heartbeat_cancel.cancelled() => break,
                    }
                }
            }
        });

        let outcome: HandlerOutcome = tokio::select! {
            outcome = handler.handle(task, cancel.clone()) => outcome,
            _ = cancel.cancelled() => HandlerOutcome::nack(),
        };
        heartbeat_cancel.cancel();
        let _ = heartbeat_handle.await;

        match outcome.disposition {
            qrunner_core::Disposition::Ack => {
                client
                    .delete_message()
                    .queue_url(queue_url)
                    .receipt_handle(&receipt_handle)
                    .send()
                    .await
                    .map_err(|e| AdapterError::transient(region, queue.as_str(), e))?;
            }
            qrunner_core::Disposition::Nack => {
                client
                    .change_message_visibility()
                    .queue_url(queue_url)
                    .receipt_handle(&receipt_handle)
                    .visibility_timeout(0)
                    .send()
                    .await
                    .map_err(|e| AdapterError::transient(region, queue.as_str(), e))?;
            }
        }
        Ok(WorkOutcome::Processed)
    }

    async fn exists(&self, queue: &QueueName) -> Result<bool, AdapterError> {
        let location = match self.location_for(queue) {
            Ok(loc) => loc,
            Err(_) => return Ok(false),
        };
        let client = self.client_for(&location.region).await?;
        match client
            .get_queue_attributes()
            .queue_url(&location.queue_url)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    async fn has_work(&self, _queue: &QueueName) -> Result<bool, AdapterError> {
        // SQS has no cheap peek; always report true (spec.md §4.6).
        Ok(true)
    }

    async fn responder(
        &self,
        queue: &QueueName,
        public_key: Option<&[u8]>,
    ) -> Result<mpsc::Sender<Report>, AdapterError> {
        let location = self.location_for(queue)?;
        let client = self.client_for(&location.region).await?;
        let response_queue_url = format!("{}-responses", location.queue_url);

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
                use base64::Engine as _;
                let encoded = base64::engine::general_purpose::STANDARD.encode(&payload);
                if let Err(e) = client
                    .send_message()
                    .queue_url(&response_queue_url)
                    .message_body(encoded)
                    .send()
                    .await
                {
                    warn!(error = %e, "failed to publish sqs report");
                }
            }
        });
        Ok(tx)
    }

    fn short_queue_name(&self, queue: &QueueName) -> String {
        queue.as_str().to_string()
    }

    fn refresh_interval(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn work_check_interval(&self) -> Duration {
        Duration::from_secs(5)
    }
}

#[cfg(test)]
#[path = "sqs_tests.rs"]
mod tests;

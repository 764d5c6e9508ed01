// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! AMQP `QueueAdapter` (spec.md §6): `lapin` for the broker connection,
//! `reqwest` against the management HTTP API for `refresh`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lapin::options::{
    BasicAckOptions, BasicGetOptions, BasicNackOptions, BasicPublishOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use parking_lot::Mutex;
use prost::Message as _;
use qrunner_core::{CredentialHandle, QueueName, QueueTask, Report};
use regex::Regex;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::adapter::{HandlerOutcome, QueueAdapter, TaskHandler, WorkOutcome};
use crate::error::AdapterError;

/// AMQP-side resolved queue shape returned by the management API.
#[derive(Debug, Deserialize)]
struct ManagementQueue {
    name: String,
}

/// Connects to a broker and its management HTTP API, caching one channel
/// for reuse across calls.
pub struct AmqpAdapter {
    amqp_url: String,
    management_url: String,
    vhost: String,
    http: reqwest::Client,
    channel: Arc<tokio::sync::Mutex<Option<Channel>>>,
    // Per-message heartbeat floor: AMQP leases don't expire, but we still
    // tick so connection loss is observed promptly (spec.md §4.6).
    heartbeat_floor: Duration,
}

impl Clone for AmqpAdapter {
    fn clone(&self) -> Self {
        Self {
            amqp_url: self.amqp_url.clone(),
            management_url: self.management_url.clone(),
            vhost: self.vhost.clone(),
            http: self.http.clone(),
            channel: self.channel.clone(),
            heartbeat_floor: self.heartbeat_floor,
        }
    }
}

impl AmqpAdapter {
    pub fn new(amqp_url: impl Into<String>, management_url: impl Into<String>, vhost: impl Into<String>) -> Self {
        Self {
            amqp_url: amqp_url.into(),
            management_url: management_url.into(),
            vhost: vhost.into(),
            http: reqwest::Client::new(),
            channel: Arc::new(tokio::sync::Mutex::new(None)),
            heartbeat_floor: Duration::from_secs(5),
        }
    }

    async fn channel(&self) -> Result<Channel, AdapterError> {
        let mut guard = self.channel.lock().await;
        if let Some(ch) = guard.as_ref() {
            if ch.status().connected() {
                return Ok(ch.clone());
            }
        }
        let conn = Connection::connect(&self.amqp_url, ConnectionProperties::default())
            .await
            .map_err(|e| AdapterError::transient(&self.amqp_url, "", e))?;
        let ch = conn
            .create_channel()
            .await
            .map_err(|e| AdapterError::transient(&self.amqp_url, "", e))?;
        *guard = Some(ch.clone());
        Ok(ch)
    }
}

#[async_trait]
impl QueueAdapter for AmqpAdapter {
    async fn refresh(
        &self,
        name_match: &Regex,
        name_mismatch: &Regex,
    ) -> Result<HashMap<QueueName, CredentialHandle>, AdapterError> {
        let url = format!(
            "{}/api/queues/{}",
            self.management_url.trim_end_matches('/'),
            urlencoding_vhost(&self.vhost)
        );
        let queues: Vec<ManagementQueue> = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::transient(&self.amqp_url, "", e))?
            .json()
            .await
            .map_err(|e| AdapterError::transient(&self.amqp_url, "", e))?;

        Ok(queues
            .into_iter()
            .filter(|q| name_match.is_match(&q.name) && !name_mismatch.is_match(&q.name))
            .map(|q| {
                (
                    QueueName::new(q.name),
                    CredentialHandle::new(self.amqp_url.clone()),
                )
            })
            .collect())
    }

    async fn work(
        &self,
        queue: &QueueName,
        _credential: &CredentialHandle,
        handler: &(dyn TaskHandler),
        cancel: CancellationToken,
    ) -> Result<WorkOutcome, AdapterError> {
        let channel = self.channel().await?;
        channel
            .queue_declare(queue.as_str(), QueueDeclareOptions::default(), FieldTable::default())
            .await
            .map_err(|e| AdapterError::transient(&self.amqp_url, queue.as_str(), e))?;

        let message = channel
            .basic_get(queue.as_str(), BasicGetOptions { no_ack: false })
            .await
            .map_err(|e| AdapterError::transient(&self.amqp_url, queue.as_str(), e))?;

        let Some(message) = message else {
            return Ok(WorkOutcome::NoMessage);
        };
        let delivery_tag = message.delivery_tag;
        let task = QueueTask::new(
            qrunner_core::ServerId::new(self.amqp_url.clone()),
            queue.clone(),
            self.short_queue_name(queue),
            CredentialHandle::new(self.amqp_url.clone()),
            message.data,
        );

        let heartbeat_floor = self.heartbeat_floor;
        let heartbeat_cancel = cancel.child_token();
        let heartbeat_handle = tokio::spawn({
            let heartbeat_cancel = heartbeat_cancel.clone();
            async move {
                let mut tick = tokio::time::interval(heartbeat_floor);
                loop {
                    tokio::select! {
                        _ = tick.tick() => debug!("amqp heartbeat tick (connection-level keepalive)"),
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
                channel
                    .basic_ack(delivery_tag, BasicAckOptions::default())
                    .await
                    .map_err(|e| AdapterError::transient(&self.amqp_url, queue.as_str(), e))?;
            }
            qrunner_core::Disposition::Nack => {
                channel
                    .basic_nack(delivery_tag, BasicNackOptions { requeue: true, ..Default::default() })
                    .await
                    .map_err(|e| AdapterError::transient(&self.amqp_url, queue.as_str(), e))?;
            }
        }
        Ok(WorkOutcome::Processed)
    }

    async fn exists(&self, queue: &QueueName) -> Result<bool, AdapterError> {
        let channel = self.channel().await?;
        match channel
            .queue_declare(
                queue.as_str(),
                QueueDeclareOptions {
                    passive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
        {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    async fn has_work(&self, queue: &QueueName) -> Result<bool, AdapterError> {
        let channel = self.channel().await?;
        let decl = channel
            .queue_declare(
                queue.as_str(),
                QueueDeclareOptions {
                    passive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| AdapterError::transient(&self.amqp_url, queue.as_str(), e))?;
        Ok(decl.message_count() > 0)
    }

    async fn responder(
        &self,
        queue: &QueueName,
        public_key: Option<&[u8]>,
    ) -> Result<mpsc::Sender<Report>, AdapterError> {
        let channel = self.channel().await?;
        let response_queue = format!("{}.responses", queue.as_str());
        channel
            .queue_declare(&response_queue, QueueDeclareOptions::default(), FieldTable::default())
            .await
            .map_err(|e| AdapterError::transient(&self.amqp_url, &response_queue, e))?;

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
                if let Err(e) = channel
                    .basic_publish(
                        "",
                        &response_queue,
                        BasicPublishOptions::default(),
                        &payload,
                        BasicProperties::default(),
                    )
                    .await
                {
                    warn!(error = %e, "failed to publish report");
                }
            }
        });
        Ok(tx)
    }

    fn short_queue_name(&self, queue: &QueueName) -> String {
        queue.as_str().to_string()
    }

    fn refresh_interval(&self) -> Duration {
        Duration::from_secs(30)
    }

    fn work_check_interval(&self) -> Duration {
        Duration::from_secs(5)
    }
}

fn urlencoding_vhost(vhost: &str) -> String {
    if vhost == "/" {
        "%2F".to_string()
    } else {
        vhost.to_string()
    }
}

#[cfg(test)]
#[path = "amqp_tests.rs"]
mod tests;

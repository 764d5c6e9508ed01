// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Servers Registry ("Projects", C8, spec.md §4.8): one Queuer per
//! logical server, created and cancelled as a Backend Service's discovery
//! pass reports servers appearing and disappearing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use qrunner_adapters::{EncryptionKeyStore, QueueAdapter, TaskHandler};
use qrunner_core::{Clock, ServerId};
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::backoff::BackoffRegistry;
use crate::busy::BusyRegistry;
use crate::ledger::ResourceLedger;
use crate::queuer::Queuer;

struct Entry {
    cancel: CancellationToken,
}

/// Object-safe seam so a process can hold every backend's
/// `ServersRegistry<A, C>` (each parameterized over a different adapter
/// type) in one `Vec<Arc<dyn OpenForBusiness>>` and freeze them all when
/// the Limiter's `NoNewTasksFlag` trips (spec.md §4.11).
pub trait OpenForBusiness: Send + Sync {
    fn set_open_for_business(&self, open: bool);
}

/// Cyclic references between the registry and its Queuers are broken by
/// cancellation tokens rather than parent pointers (spec.md §9): a
/// Queuer's cancel function is the only thing the registry holds.
pub struct ServersRegistry<A: QueueAdapter, C: Clock> {
    adapter_factory: Box<dyn Fn(&ServerId) -> A + Send + Sync>,
    clock: C,
    backoff: Arc<BackoffRegistry<C>>,
    busy: Arc<BusyRegistry>,
    ledger: Arc<ResourceLedger>,
    handler: Arc<dyn TaskHandler>,
    name_match: Regex,
    name_mismatch: Regex,
    encrypt_keys: Option<Arc<EncryptionKeyStore>>,
    servers: Mutex<HashMap<ServerId, Entry>>,
    open_for_business: AtomicBool,
}

impl<A: QueueAdapter, C: Clock + Clone + 'static> ServersRegistry<A, C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        adapter_factory: impl Fn(&ServerId) -> A + Send + Sync + 'static,
        clock: C,
        backoff: Arc<BackoffRegistry<C>>,
        busy: Arc<BusyRegistry>,
        ledger: Arc<ResourceLedger>,
        handler: Arc<dyn TaskHandler>,
        name_match: Regex,
        name_mismatch: Regex,
        encrypt_keys: Option<Arc<EncryptionKeyStore>>,
    ) -> Self {
        Self {
            adapter_factory: Box::new(adapter_factory),
            clock,
            backoff,
            busy,
            ledger,
            handler,
            name_match,
            name_mismatch,
            encrypt_keys,
            servers: Mutex::new(HashMap::new()),
            open_for_business: AtomicBool::new(true),
        }
    }

    /// Freezes additions during shutdown while leaving existing Queuers
    /// running to drain (spec.md §4.8's "open for business" flag).
    pub fn set_open_for_business(&self, open: bool) {
        self.open_for_business.store(open, Ordering::SeqCst);
    }

    pub fn server_count(&self) -> usize {
        self.servers.lock().len()
    }

    pub fn known_servers(&self) -> Vec<ServerId> {
        self.servers.lock().keys().cloned().collect()
    }

    /// Reconciles `discovered` against the registry: starts a Queuer for
    /// each newly-discovered server, and cancels the Queuer for each
    /// previously-known server now absent. At most one Queuer per server
    /// identity exists at any moment (spec.md §4.8's invariant).
    pub fn cycle(self: &Arc<Self>, discovered: &[ServerId], parent: &CancellationToken) {
        let discovered_set: std::collections::HashSet<&ServerId> = discovered.iter().collect();
        let mut servers = self.servers.lock();

        let stale: Vec<ServerId> = servers
            .keys()
            .filter(|s| !discovered_set.contains(s))
            .cloned()
            .collect();
        for server in &stale {
            if let Some(entry) = servers.remove(server) {
                entry.cancel.cancel();
                info!(server = %server, "server no longer discovered, queuer cancelled");
            }
        }

        if !self.open_for_business.load(Ordering::SeqCst) {
            return;
        }

        for server in discovered {
            if servers.contains_key(server) {
                continue;
            }
            let cancel = parent.child_token();
            servers.insert(server.clone(), Entry { cancel: cancel.clone() });
            let queuer = Arc::new(Queuer::new(
                server.clone(),
                (self.adapter_factory)(server),
                self.clock.clone(),
                self.backoff.clone(),
                self.busy.clone(),
                self.ledger.clone(),
                self.handler.clone(),
                self.name_match.clone(),
                self.name_mismatch.clone(),
                self.encrypt_keys.clone(),
            ));
            info!(server = %server, "new server discovered, queuer starting");
            tokio::spawn(async move { queuer.run(cancel).await });
        }
    }

    /// Cancels every known server's Queuer, used on process shutdown.
    pub fn cancel_all(&self) {
        let mut servers = self.servers.lock();
        for (server, entry) in servers.drain() {
            entry.cancel.cancel();
            info!(server = %server, "server cancelled on shutdown");
        }
    }
}

impl<A: QueueAdapter, C: Clock + Clone + 'static> OpenForBusiness for ServersRegistry<A, C> {
    fn set_open_for_business(&self, open: bool) {
        ServersRegistry::set_open_for_business(self, open);
    }
}

#[cfg(test)]
#[path = "servers_tests.rs"]
mod tests;

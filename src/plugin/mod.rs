// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The DNS-plane half: an interceptor installed in a recursive-resolver
//! handler chain.
//!
//! The plugin watches `DNSNameResolver` objects, maintains the in-memory
//! name index from the watch events, and, for every intercepted A/AAAA
//! response touching a tracked name, publishes the observed addresses,
//! TTLs and failures into the objects' status.
//!
//! Lifecycle follows the host contract: [`DnsNameResolverPlugin::on_startup`]
//! starts the watch and waits briefly for the initial sync;
//! [`DnsNameResolverPlugin::on_shutdown`] stops it, exactly once.

pub mod chain;
pub mod config;
pub mod handler;
pub mod index;
pub mod update;

use crate::constants::{
    PLUGIN_NAME, SYNC_POLL_INTERVAL_MILLIS, SYNC_WAIT_LOG_INTERVAL_MILLIS,
    SYNC_WAIT_TIMEOUT_MILLIS,
};
use crate::crd::DNSNameResolver;
use crate::plugin::chain::{DnsHandler, DnsResponseWriter};
use crate::plugin::config::PluginConfig;
use crate::plugin::index::NameIndex;
use crate::store::{KubeResolverStore, ResolverStore};
use anyhow::{bail, Result};
use futures::{StreamExt, TryStreamExt};
use hickory_client::op::{Message, ResponseCode};
use kube::runtime::reflector::store::Writer;
use kube::runtime::{reflector, watcher};
use kube::{Api, Client, ResourceExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{info, warn};

/// What the watch task needs to run; taken by `on_startup`.
struct WatchSource {
    api: Api<DNSNameResolver>,
    writer: Writer<DNSNameResolver>,
    stop_rx: oneshot::Receiver<()>,
}

struct StopState {
    stop_tx: Option<oneshot::Sender<()>>,
    shutdown: bool,
}

/// The interceptor plugin.
pub struct DnsNameResolverPlugin {
    pub(crate) next: Option<Arc<dyn DnsHandler>>,
    pub(crate) minimum_ttl: i32,
    pub(crate) failure_threshold: i32,
    namespaces: Arc<HashSet<String>>,
    pub(crate) index: Arc<NameIndex>,
    pub(crate) store: Arc<dyn ResolverStore>,
    synced: Arc<AtomicBool>,
    watch: Mutex<Option<WatchSource>>,
    stop: Mutex<StopState>,
}

impl DnsNameResolverPlugin {
    /// Create a plugin wired to the cluster: the watch feeds both the name
    /// index and the lister cache backing the status updates.
    #[must_use]
    pub fn new(config: PluginConfig, client: Client) -> Self {
        let (reader, writer) = reflector::store();
        let api: Api<DNSNameResolver> = Api::all(client.clone());
        let store: Arc<dyn ResolverStore> = Arc::new(KubeResolverStore::new(client, reader));
        let (stop_tx, stop_rx) = oneshot::channel();

        Self {
            next: None,
            minimum_ttl: config.minimum_ttl,
            failure_threshold: config.failure_threshold,
            namespaces: Arc::new(config.namespaces),
            index: Arc::new(NameIndex::new()),
            store,
            synced: Arc::new(AtomicBool::new(false)),
            watch: Mutex::new(Some(WatchSource {
                api,
                writer,
                stop_rx,
            })),
            stop: Mutex::new(StopState {
                stop_tx: Some(stop_tx),
                shutdown: false,
            }),
        }
    }

    /// Create a plugin over an externally supplied store, with no watch of
    /// its own. The caller is responsible for populating the name index.
    #[must_use]
    pub fn with_store(config: PluginConfig, store: Arc<dyn ResolverStore>) -> Self {
        let (stop_tx, _stop_rx) = oneshot::channel();
        Self {
            next: None,
            minimum_ttl: config.minimum_ttl,
            failure_threshold: config.failure_threshold,
            namespaces: Arc::new(config.namespaces),
            index: Arc::new(NameIndex::new()),
            store,
            synced: Arc::new(AtomicBool::new(true)),
            watch: Mutex::new(None),
            stop: Mutex::new(StopState {
                stop_tx: Some(stop_tx),
                shutdown: false,
            }),
        }
    }

    /// Install the next handler in the chain.
    pub fn set_next(&mut self, next: Arc<dyn DnsHandler>) {
        self.next = Some(next);
    }

    /// The name index maintained from watch events.
    #[must_use]
    pub fn index(&self) -> &Arc<NameIndex> {
        &self.index
    }

    pub(crate) async fn forward(
        &self,
        request: &Message,
        writer: &mut dyn DnsResponseWriter,
    ) -> Result<ResponseCode> {
        match &self.next {
            Some(next) => next.serve_dns(request, writer).await,
            None => bail!("no next handler in the chain after {PLUGIN_NAME}"),
        }
    }

    /// Start the `DNSNameResolver` watch and wait for the initial sync.
    ///
    /// Waits up to five seconds, logging every 500ms while the sync is
    /// pending; after the timeout the plugin serves with an unsynced index
    /// rather than blocking the host.
    ///
    /// # Errors
    ///
    /// Currently infallible in practice; the `Result` is part of the host
    /// startup-callback contract.
    pub async fn on_startup(&self) -> Result<()> {
        let source = self.watch.lock().unwrap().take();
        if let Some(source) = source {
            let index = Arc::clone(&self.index);
            let namespaces = Arc::clone(&self.namespaces);
            let synced = Arc::clone(&self.synced);
            tokio::spawn(run_watch(source, index, namespaces, synced));
        }

        let deadline = Instant::now() + Duration::from_millis(SYNC_WAIT_TIMEOUT_MILLIS);
        let mut next_log = Instant::now() + Duration::from_millis(SYNC_WAIT_LOG_INTERVAL_MILLIS);
        loop {
            if self.synced.load(Ordering::SeqCst) {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                warn!("starting server with an unsynced DNSNameResolver watch");
                return Ok(());
            }
            if now >= next_log {
                warn!("waiting for DNSNameResolver watch sync before starting server");
                next_log += Duration::from_millis(SYNC_WAIT_LOG_INTERVAL_MILLIS);
            }
            tokio::time::sleep(Duration::from_millis(SYNC_POLL_INTERVAL_MILLIS)).await;
        }
    }

    /// Stop the watch. The stop channel is closed exactly once; a second
    /// call fails.
    ///
    /// # Errors
    ///
    /// Returns an error when shutdown was already requested.
    pub fn on_shutdown(&self) -> Result<()> {
        let mut stop = self.stop.lock().unwrap();
        if stop.shutdown {
            bail!("shutdown already in progress");
        }
        if let Some(stop_tx) = stop.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        stop.shutdown = true;
        Ok(())
    }
}

/// Drive the watch stream: every event updates the lister cache, and add /
/// delete events maintain the name index for the monitored namespaces.
async fn run_watch(
    source: WatchSource,
    index: Arc<NameIndex>,
    namespaces: Arc<HashSet<String>>,
    synced: Arc<AtomicBool>,
) {
    let WatchSource {
        api,
        mut writer,
        mut stop_rx,
    } = source;

    let stream = watcher(api, watcher::Config::default());
    let mut stream = stream.boxed();

    loop {
        tokio::select! {
            _ = &mut stop_rx => {
                info!("DNSNameResolver watch stopped");
                return;
            }
            event = stream.try_next() => match event {
                Ok(Some(event)) => {
                    writer.apply_watcher_event(&event);
                    handle_watch_event(&event, &index, &namespaces, &synced);
                }
                Ok(None) => {
                    warn!("DNSNameResolver watch stream ended");
                    return;
                }
                Err(error) => {
                    warn!(error = %error, "DNSNameResolver watch error");
                }
            }
        }
    }
}

fn handle_watch_event(
    event: &watcher::Event<DNSNameResolver>,
    index: &NameIndex,
    namespaces: &HashSet<String>,
    synced: &AtomicBool,
) {
    match event {
        watcher::Event::Apply(obj) | watcher::Event::InitApply(obj) => {
            if let Some((dns_name, namespace, name)) = object_key(obj, namespaces) {
                index.insert(&dns_name, &namespace, &name);
            }
        }
        watcher::Event::Delete(obj) => {
            if let Some((dns_name, namespace, name)) = object_key(obj, namespaces) {
                index.remove(&dns_name, &namespace, &name);
            }
        }
        watcher::Event::Init => {}
        watcher::Event::InitDone => {
            synced.store(true, Ordering::SeqCst);
        }
    }
}

/// Extract the (spec name, namespace, object name) triple of a watched
/// object, dropping objects without a namespace and objects outside the
/// monitored set.
fn object_key(
    obj: &DNSNameResolver,
    namespaces: &HashSet<String>,
) -> Option<(String, String, String)> {
    let Some(namespace) = obj.namespace() else {
        warn!(name = %obj.name_any(), "dropping DNSNameResolver event without a namespace");
        return None;
    };
    if !namespaces.is_empty() && !namespaces.contains(&namespace) {
        return None;
    }
    Some((obj.spec.name.clone(), namespace, obj.name_any()))
}

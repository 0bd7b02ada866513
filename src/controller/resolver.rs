// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! TTL-ordered lookup scheduler.
//!
//! The [`Resolver`] tracks every DNS name referenced by a `DNSNameResolver`
//! object together with the earliest next-lookup time across its addresses.
//! A single timer task waits for the earliest expiry and issues a synthetic
//! lookup against the CoreDNS pods, not to learn addresses directly, but to
//! make the local resolver (with the interceptor in its chain) revisit the
//! name and publish fresh status.
//!
//! The timer task is cooperative: `add` nudges it through a unit
//! notification whenever the name set changes, and `delete` hands it the
//! removed name so it can tell whether the name it was waiting on just
//! disappeared. Both signals are sent after the state lock is released.

use crate::constants::{
    DEFAULT_MAX_TTL_SECS, DNS_PORT, LOOKUP_TIMEOUT_SECS, MAX_COREDNS_POD_IPS,
};
use crate::controller::sampler::PodIpSampler;
use crate::crd::ResolvedAddress;
use crate::metrics;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hickory_client::client::{Client, SyncClient};
use hickory_client::rr::{DNSClass, Name, RecordType};
use hickory_client::udp::UdpClientConnection;
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tracing::{info, warn};

/// Scheduling details for one tracked DNS name.
#[derive(Clone, Default)]
struct ResolvedNameDetails {
    min_next_lookup_time: Option<DateTime<Utc>>,
    regular_obj_exists: bool,
    wildcard_obj_exists: bool,
    num_ips: usize,
}

#[derive(Default)]
struct ResolverState {
    /// DNS name -> scheduling details. An entry exists iff at least one of
    /// the object-exists flags is set.
    dns_names: HashMap<String, ResolvedNameDetails>,
    /// Regular object name -> the single DNS name it tracks.
    regular_obj_info: HashMap<String, String>,
    /// Wildcard object name -> every DNS name observed under it.
    wildcard_obj_info: HashMap<String, HashSet<String>>,
}

/// Issues synthetic lookups for a DNS name. Split out as a trait so the
/// scheduler can be exercised without a DNS server.
#[async_trait]
pub trait NameLookup: Send + Sync {
    /// Force the recursive resolver to revisit `dns_name`. `num_ips` is the
    /// current size of the name's address set and controls the fan-out.
    async fn lookup(&self, dns_name: &str, num_ips: usize) -> Result<()>;
}

/// The scheduler.
pub struct Resolver {
    state: Mutex<ResolverState>,
    lookup: Arc<dyn NameLookup>,
    added: Notify,
    deleted_tx: mpsc::UnboundedSender<String>,
    deleted_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl Resolver {
    /// Create a scheduler that performs lookups through `lookup`.
    #[must_use]
    pub fn new(lookup: Arc<dyn NameLookup>) -> Self {
        let (deleted_tx, deleted_rx) = mpsc::unbounded_channel();
        Self {
            state: Mutex::new(ResolverState::default()),
            lookup,
            added: Notify::new(),
            deleted_tx,
            deleted_rx: Mutex::new(Some(deleted_rx)),
        }
    }

    /// Start the timer task. Subsequent calls are no-ops.
    pub fn start(self: &Arc<Self>) {
        let Some(mut deleted_rx) = self.deleted_rx.lock().unwrap().take() else {
            warn!("resolver timer task already started");
            return;
        };
        let resolver = Arc::clone(self);

        tokio::spawn(async move {
            let max_ttl = Duration::from_secs(DEFAULT_MAX_TTL_SECS);
            let mut next_dns_name: Option<String> = None;
            let mut num_ips = 0usize;
            let mut deadline = tokio::time::Instant::now() + max_ttl;

            loop {
                tokio::select! {
                    () = resolver.added.notified() => {
                        // The name set changed; fall through and re-arm.
                    }
                    () = tokio::time::sleep_until(deadline) => {
                        if let Some(dns_name) = &next_dns_name {
                            if let Err(error) = resolver.lookup.lookup(dns_name, num_ips).await {
                                info!(
                                    dns_name = %dns_name,
                                    error = %error,
                                    "encountered error while looking up DNS name"
                                );
                            }
                        }
                    }
                    deleted = deleted_rx.recv() => {
                        match deleted {
                            // Another name was deleted; the armed timer is
                            // still valid.
                            Some(name) if next_dns_name.as_deref() != Some(name.as_str()) => {
                                continue;
                            }
                            Some(_) => {}
                            None => return,
                        }
                    }
                }

                match resolver.next_dns_name_details() {
                    Some((dns_name, next_lookup_time, ips)) => {
                        let remaining = next_lookup_time - Utc::now();
                        let time_till = if remaining <= chrono::Duration::zero() {
                            // The TTL already lapsed; retry immediately
                            // instead of waiting out the regular clamp.
                            Duration::from_millis(1)
                        } else {
                            get_time_till_next_lookup(true, remaining)
                        };
                        next_dns_name = Some(dns_name);
                        num_ips = ips;
                        deadline = tokio::time::Instant::now() + time_till;
                    }
                    None => {
                        next_dns_name = None;
                        num_ips = 0;
                        deadline = tokio::time::Instant::now() + max_ttl;
                    }
                }
            }
        });
    }

    /// Track (or refresh) a DNS name on behalf of an object.
    ///
    /// Called for every resolved name whenever a `DNSNameResolver` object is
    /// added or updated. `matches_regular` says whether the object's spec is
    /// a regular name; inconsistent bookkeeping input is rejected. A name
    /// with no addresses yet is armed at the maximum TTL and looked up once
    /// right away.
    pub fn add(
        &self,
        dns_name: &str,
        resolved_addresses: &[ResolvedAddress],
        matches_regular: bool,
        obj_name: &str,
    ) {
        let mut spawn_first_lookup = false;
        {
            let mut state = self.state.lock().unwrap();

            let exists = state.dns_names.contains_key(dns_name);
            if exists {
                let details = &state.dns_names[dns_name];
                if details.regular_obj_exists && matches_regular {
                    // The name is already claimed by a regular object; only
                    // the same object may refresh it.
                    match state.regular_obj_info.get(obj_name) {
                        Some(tracked) if tracked == dns_name => {}
                        _ => return,
                    }
                } else if details.wildcard_obj_exists && !matches_regular {
                    match state.wildcard_obj_info.get(obj_name) {
                        Some(tracked) if tracked.contains(dns_name) => {}
                        _ => return,
                    }
                }
            }

            let entry = state.dns_names.entry(dns_name.to_string()).or_default();
            if resolved_addresses.is_empty() {
                if !exists {
                    entry.min_next_lookup_time = Some(
                        Utc::now() + chrono::Duration::seconds(DEFAULT_MAX_TTL_SECS as i64),
                    );
                    spawn_first_lookup = true;
                }
            } else {
                entry.min_next_lookup_time = resolved_addresses
                    .iter()
                    .map(ResolvedAddress::next_lookup_time)
                    .min();
            }
            entry.num_ips = resolved_addresses.len();
            if matches_regular {
                entry.regular_obj_exists = true;
            } else {
                entry.wildcard_obj_exists = true;
            }

            if matches_regular {
                state
                    .regular_obj_info
                    .insert(obj_name.to_string(), dns_name.to_string());
            } else {
                state
                    .wildcard_obj_info
                    .entry(obj_name.to_string())
                    .or_default()
                    .insert(dns_name.to_string());
            }
        }

        if spawn_first_lookup {
            let lookup = Arc::clone(&self.lookup);
            let dns_name = dns_name.to_string();
            tokio::spawn(async move {
                if let Err(error) = lookup.lookup(&dns_name, 0).await {
                    info!(
                        dns_name = %dns_name,
                        error = %error,
                        "encountered error while looking up DNS name"
                    );
                }
            });
        }

        self.added.notify_one();
    }

    /// Forget every DNS name an object covered. Names left with neither a
    /// regular nor a wildcard owner are dropped and signaled to the timer.
    pub fn delete(&self, obj_name: &str) {
        let mut deleted_names = Vec::new();
        {
            let mut state = self.state.lock().unwrap();

            let (matches_regular, dns_name_list) =
                if let Some(dns_name) = state.regular_obj_info.remove(obj_name) {
                    (true, vec![dns_name])
                } else if let Some(dns_names) = state.wildcard_obj_info.remove(obj_name) {
                    (false, dns_names.into_iter().collect())
                } else {
                    return;
                };

            for dns_name in dns_name_list {
                let Some(details) = state.dns_names.get_mut(&dns_name) else {
                    continue;
                };
                if matches_regular {
                    details.regular_obj_exists = false;
                } else {
                    details.wildcard_obj_exists = false;
                }
                if !details.regular_obj_exists && !details.wildcard_obj_exists {
                    state.dns_names.remove(&dns_name);
                    deleted_names.push(dns_name);
                }
            }
        }

        for dns_name in deleted_names {
            let _ = self.deleted_tx.send(dns_name);
        }
    }

    /// The DNS name with the earliest next-lookup time, together with that
    /// time and its address count. `None` when no name is tracked.
    #[must_use]
    pub fn next_dns_name_details(&self) -> Option<(String, DateTime<Utc>, usize)> {
        let state = self.state.lock().unwrap();
        let mut earliest: Option<(String, DateTime<Utc>, usize)> = None;
        for (dns_name, details) in &state.dns_names {
            let Some(next_lookup_time) = details.min_next_lookup_time else {
                continue;
            };
            let earlier = earliest
                .as_ref()
                .is_none_or(|(_, current, _)| next_lookup_time < *current);
            if earlier {
                earliest = Some((dns_name.clone(), next_lookup_time, details.num_ips));
            }
        }
        earliest
    }
}

/// Clamp the time until the next synthetic lookup.
///
/// No tracked name, or more than the maximum TTL remaining, waits the
/// maximum TTL; an already-lapsed deadline re-arms at twice the lookup
/// timeout; anything else waits exactly the remaining duration.
#[must_use]
pub fn get_time_till_next_lookup(exists: bool, remaining: chrono::Duration) -> Duration {
    let max_ttl = Duration::from_secs(DEFAULT_MAX_TTL_SECS);
    if !exists {
        return max_ttl;
    }
    if remaining > chrono::Duration::seconds(DEFAULT_MAX_TTL_SECS as i64) {
        return max_ttl;
    }
    if remaining <= chrono::Duration::zero() {
        return Duration::from_secs(2 * LOOKUP_TIMEOUT_SECS);
    }
    remaining.to_std().unwrap_or(max_ttl)
}

/// Synthetic lookups against the CoreDNS pods.
pub struct CoreDnsLookup {
    sampler: PodIpSampler,
}

impl CoreDnsLookup {
    /// Create a lookup that samples pod IPs from `sampler`.
    #[must_use]
    pub fn new(sampler: PodIpSampler) -> Self {
        Self { sampler }
    }
}

#[async_trait]
impl NameLookup for CoreDnsLookup {
    async fn lookup(&self, dns_name: &str, num_ips: usize) -> Result<()> {
        // A name with at most one address needs only a single pod to
        // refresh it; larger sets fan out so differing per-pod answers all
        // pass the interceptor.
        let max_ips = if num_ips <= 1 { 1 } else { MAX_COREDNS_POD_IPS };
        let pod_ips = self.sampler.random_pod_ips(max_ips).await?;

        let name = Name::from_str(dns_name)
            .with_context(|| format!("invalid DNS name: {dns_name}"))?;

        for record_type in [RecordType::A, RecordType::AAAA] {
            for pod_ip in &pod_ips {
                let Ok(ip) = pod_ip.parse::<IpAddr>() else {
                    warn!(pod_ip = %pod_ip, "skipping unparsable CoreDNS pod IP");
                    continue;
                };
                let server = SocketAddr::new(ip, DNS_PORT);
                let name = name.clone();

                // hickory's client connection is synchronous; run the
                // exchange on the blocking pool with the query timeout.
                let result = tokio::task::spawn_blocking(move || -> Result<()> {
                    let conn = UdpClientConnection::with_timeout(
                        server,
                        Duration::from_secs(LOOKUP_TIMEOUT_SECS),
                    )
                    .context("failed to create UDP connection")?;
                    let client = SyncClient::new(conn);
                    client
                        .query(&name, DNSClass::IN, record_type)
                        .context("DNS query failed")?;
                    Ok(())
                })
                .await;

                match result {
                    Ok(Ok(())) => metrics::record_synthetic_lookup_success(),
                    Ok(Err(error)) => {
                        metrics::record_synthetic_lookup_error();
                        info!(
                            dns_name = %dns_name,
                            pod_ip = %pod_ip,
                            record_type = %record_type,
                            error = %error,
                            "failed to lookup DNS name from CoreDNS pod"
                        );
                    }
                    Err(error) => {
                        metrics::record_synthetic_lookup_error();
                        warn!(error = %error, "synthetic lookup task failed");
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod resolver_tests;

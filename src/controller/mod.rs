// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The operator-side half: the status reconciler.
//!
//! A kube-runtime controller watches `DNSNameResolver` objects in the
//! configured namespace. Every event drives the scheduler's add/delete
//! inputs, prunes resolved addresses whose TTL plus the removal grace period
//! has lapsed, and requeues itself to come back exactly when the next
//! address crosses its grace boundary.

pub mod resolver;
pub mod sampler;

use crate::constants::{ERROR_REQUEUE_DURATION_SECS, IP_REMOVAL_GRACE_PERIOD_SECS};
use crate::controller::resolver::Resolver;
use crate::crd::{DNSNameResolver, DNSNameResolverStatus};
use crate::dns_names::is_wildcard;
use crate::metrics;
use crate::retry::update_status_with_conflict_retry;
use crate::store::{ApiResolverStore, ResolverStore};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use futures::StreamExt;
use kube::runtime::controller::Action;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

struct Context {
    client: Client,
    store: Arc<dyn ResolverStore>,
    resolver: Arc<Resolver>,
}

/// Run the `DNSNameResolver` controller until its watch ends.
///
/// # Errors
///
/// Currently only fails through the fallible controller setup; a healthy
/// controller runs forever.
pub async fn run_controller(
    client: Client,
    resolver: Arc<Resolver>,
    namespace: &str,
) -> Result<()> {
    info!(namespace, "starting DNSNameResolver controller");

    let api: Api<DNSNameResolver> = Api::namespaced(client.clone(), namespace);
    let store: Arc<dyn ResolverStore> = Arc::new(ApiResolverStore::new(client.clone()));

    Controller::new(api, watcher::Config::default())
        .run(
            reconcile,
            error_policy,
            Arc::new(Context {
                client,
                store,
                resolver,
            }),
        )
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

async fn reconcile(
    obj: Arc<DNSNameResolver>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();
    let api: Api<DNSNameResolver> = Api::namespaced(ctx.client.clone(), &namespace);

    let current = match api.get(&name).await {
        Ok(current) => current,
        Err(kube::Error::Api(response)) if response.code == 404 => {
            // The object is gone; stop scheduling lookups for its names.
            debug!(namespace, name, "DNSNameResolver deleted, dropping tracked names");
            ctx.resolver.delete(&name);
            metrics::record_reconciliation("deleted");
            return Ok(Action::await_change());
        }
        Err(error) => return Err(ReconcileError(error.into())),
    };

    let spec_name = current.spec.name.clone();
    let matches_regular = !is_wildcard(&spec_name);
    let mut status = current.status.clone().unwrap_or_default();
    let now = Utc::now();

    // Drop addresses whose TTL and grace period have both lapsed.
    let mut pruned = status.clone();
    if removal_of_ips_required(&mut pruned, now) {
        update_status_with_conflict_retry(ctx.store.as_ref(), &namespace, &name, |obj| {
            let status = obj.status.get_or_insert_with(Default::default);
            removal_of_ips_required(status, Utc::now())
        })
        .await
        .map_err(|error| ReconcileError(error.into()))?;
        status = pruned;
    }

    // Keep the scheduler's view of the object current.
    if status.resolved_names.is_empty() {
        ctx.resolver.add(&spec_name, &[], matches_regular, &name);
    } else {
        for resolved_name in &status.resolved_names {
            ctx.resolver.add(
                &resolved_name.dns_name,
                &resolved_name.resolved_addresses,
                matches_regular,
                &name,
            );
        }
    }

    metrics::record_reconciliation("success");

    // Come back when the next expired address crosses its grace boundary.
    let (ttl_expired, remaining) = reconcile_required(&status, now);
    if ttl_expired {
        let requeue = remaining
            .to_std()
            .unwrap_or(std::time::Duration::from_millis(1));
        debug!(namespace, name, requeue_after = ?requeue, "TTL expired, requeueing for grace pruning");
        return Ok(Action::requeue(requeue));
    }
    Ok(Action::await_change())
}

fn error_policy(obj: Arc<DNSNameResolver>, err: &ReconcileError, _ctx: Arc<Context>) -> Action {
    error!(
        name = %obj.name_any(),
        error = %err,
        "failed to reconcile DNSNameResolver"
    );
    metrics::record_reconciliation("error");
    Action::requeue(std::time::Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}

/// Remove every resolved address whose `lastLookupTime + ttl + grace` has
/// passed, mutating the status in place. Returns whether anything was
/// removed (and hence whether a status update is required).
#[must_use]
pub fn removal_of_ips_required(status: &mut DNSNameResolverStatus, now: DateTime<Utc>) -> bool {
    let grace = Duration::seconds(IP_REMOVAL_GRACE_PERIOD_SECS);
    let mut removed = false;
    for resolved_name in &mut status.resolved_names {
        let before = resolved_name.resolved_addresses.len();
        resolved_name
            .resolved_addresses
            .retain(|address| address.next_lookup_time() + grace > now);
        removed |= resolved_name.resolved_addresses.len() != before;
    }
    removed
}

/// Whether any address has an expired TTL whose grace period has not yet
/// elapsed, and the minimum remaining time until the earliest such grace
/// boundary.
#[must_use]
pub fn reconcile_required(status: &DNSNameResolverStatus, now: DateTime<Utc>) -> (bool, Duration) {
    let grace = Duration::seconds(IP_REMOVAL_GRACE_PERIOD_SECS);
    let mut ttl_expired = false;
    let mut min_remaining = Duration::zero();

    for resolved_name in &status.resolved_names {
        for address in &resolved_name.resolved_addresses {
            let next_lookup_time = address.next_lookup_time();
            if next_lookup_time > now {
                continue;
            }
            let remaining = next_lookup_time + grace - now;
            if remaining <= Duration::zero() {
                continue;
            }
            if !ttl_expired || remaining < min_remaining {
                ttl_expired = true;
                min_remaining = remaining;
            }
        }
    }

    (ttl_expired, min_remaining)
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod controller_tests;

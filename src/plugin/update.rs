// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status transformations for observed DNS answers.
//!
//! The interceptor reduces every observed answer to one of two pure status
//! transformations, [`apply_success`] for an answer carrying addresses and
//! [`apply_failure`] for a failed lookup, and pushes the result through the
//! conflict-retried update loop. Keeping the transformations free of I/O is
//! what makes the absorption and eviction rules unit-testable.
//!
//! Invariants maintained across every transformation:
//!
//! - the resolved name entry for a wildcard spec, if present, stays at
//!   index 0;
//! - no two entries share a `dnsName` and no two addresses within an entry
//!   share an IP;
//! - `resolutionFailures` is reset by any success touching the entry and the
//!   `Degraded` condition always reflects the last update.

use crate::constants::CONDITION_DEGRADED;
use crate::crd::{Condition, DNSNameResolverStatus, ResolvedAddress, ResolvedName};
use crate::dns_names::{is_same_next_lookup_time, is_wildcard};
use crate::metrics;
use crate::plugin::index::NamespaceObjects;
use crate::rcode::{rcode_message, rcode_reason};
use crate::retry::update_status_with_conflict_retry;
use crate::store::ResolverStore;
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use hickory_client::op::ResponseCode;
use std::collections::{BTreeMap, HashSet};
use tracing::error;

/// IP address to TTL mapping extracted from a DNS answer.
pub type IpTtls = BTreeMap<String, i32>;

/// Apply a successful lookup of `dns_name` with the answered `ip_ttls` to a
/// status. `spec_name` is the object's tracked name, which decides whether
/// wildcard absorption applies. Returns whether the status changed.
pub fn apply_success(
    status: &mut DNSNameResolverStatus,
    spec_name: &str,
    dns_name: &str,
    ip_ttls: &IpTtls,
    now: DateTime<Utc>,
) -> bool {
    // Index of the entry matching the looked-up name, when found.
    let mut existing_index = 0usize;
    let mut found_resolved_name = false;
    // Set while the looked-up regular name is fully covered by the wildcard
    // entry of a wildcard object; cleared again if a regular entry for the
    // name turns out to exist (its addresses then disagree with the
    // wildcard's).
    let mut matched_wildcard = false;
    let mut status_updated = false;
    // Regular-subdomain entries fully covered by the wildcard entry after a
    // wildcard lookup; removed once the walk completes.
    let mut indices_matching_wildcard: Vec<usize> = Vec::new();

    let spec_is_wildcard = is_wildcard(spec_name);
    let lookup_is_wildcard = is_wildcard(dns_name);

    for index in 0..status.resolved_names.len() {
        let entry_name = status.resolved_names[index].dns_name.clone();
        if spec_is_wildcard
            && !lookup_is_wildcard
            && entry_name.eq_ignore_ascii_case(spec_name)
        {
            // The walk is at the wildcard entry while resolving one of its
            // subdomains: the subdomain is absorbed when its answer is fully
            // contained in the wildcard's address set.
            matched_wildcard =
                is_matching_resolved_name(ip_ttls, &status.resolved_names[index], now);
        } else if entry_name.eq_ignore_ascii_case(dns_name) {
            matched_wildcard = false;
            found_resolved_name = true;
            existing_index = index;
            status_updated |=
                merge_answer_into_entry(&mut status.resolved_names[index], ip_ttls, now);
        } else if lookup_is_wildcard {
            // A wildcard lookup walks past regular-subdomain entries; the
            // ones the merged wildcard set fully covers get absorbed.
            if regular_matches_wildcard(found_resolved_name, status, index, ip_ttls, now) {
                indices_matching_wildcard.push(index);
            }
        }

        // A regular lookup against a wildcard object only ever touches the
        // wildcard entry (index 0) and the entry for the name itself; once
        // both were seen the rest of the walk is skipped.
        if !lookup_is_wildcard && spec_is_wildcard && found_resolved_name && index > 0 {
            break;
        }
    }

    if lookup_is_wildcard {
        status_updated |= remove_resolved_names(status, indices_matching_wildcard);
    }

    if !lookup_is_wildcard && matched_wildcard {
        // The regular entry is redundant with the wildcard entry covering it.
        let mut index_list = Vec::new();
        if found_resolved_name {
            index_list.push(existing_index);
        }
        status_updated |= remove_resolved_names(status, index_list);
    } else if !found_resolved_name {
        add_resolved_name(status, dns_name, ip_ttls, now);
        status_updated = true;
    }

    status_updated
}

/// Apply a failed lookup of `dns_name` with the given rcode to a status.
/// Returns whether the status changed; a failure for a name the object has
/// no entry for is a no-op.
pub fn apply_failure(
    status: &mut DNSNameResolverStatus,
    dns_name: &str,
    rcode: ResponseCode,
    failure_threshold: i32,
    minimum_ttl: i32,
    now: DateTime<Utc>,
) -> bool {
    let mut existing_index = 0usize;
    let mut found_resolved_name = false;
    let mut remove_entry = false;
    let mut status_updated = false;

    for index in 0..status.resolved_names.len() {
        if status.resolved_names[index]
            .dns_name
            .eq_ignore_ascii_case(dns_name)
        {
            found_resolved_name = true;
            existing_index = index;
            (remove_entry, status_updated) = record_failure_on_entry(
                &mut status.resolved_names[index],
                failure_threshold,
                minimum_ttl,
                rcode,
                now,
            );
        }
        if found_resolved_name {
            break;
        }
    }

    if !found_resolved_name {
        return false;
    }
    if remove_entry {
        status.resolved_names.remove(existing_index);
        status_updated = true;
    }
    status_updated
}

/// Checks if all the IP addresses in `ip_ttls` are contained in the entry's
/// resolved addresses with matching next lookup times, and the sizes agree.
fn is_matching_resolved_name(ip_ttls: &IpTtls, entry: &ResolvedName, now: DateTime<Utc>) -> bool {
    let mut matched_ips: HashSet<&str> = HashSet::new();

    for address in &entry.resolved_addresses {
        let Some(&ttl) = ip_ttls.get(&address.ip) else {
            return false;
        };
        if !is_same_next_lookup_time(address.last_lookup_time, address.ttl_seconds, ttl, now) {
            return false;
        }
        matched_ips.insert(address.ip.as_str());
    }

    ip_ttls.len() == matched_ips.len()
}

/// Merge an answer into an existing entry: refresh addresses whose next
/// lookup time drifted outside the margin, append addresses not yet present,
/// reset the failure counter and clear the `Degraded` condition.
fn merge_answer_into_entry(entry: &mut ResolvedName, ip_ttls: &IpTtls, now: DateTime<Utc>) -> bool {
    let mut matched_ips: HashSet<String> = HashSet::new();
    let mut status_updated = false;

    for address in &mut entry.resolved_addresses {
        if let Some(&ttl) = ip_ttls.get(&address.ip) {
            if !is_same_next_lookup_time(address.last_lookup_time, address.ttl_seconds, ttl, now) {
                address.ttl_seconds = ttl;
                address.last_lookup_time = now;
                status_updated = true;
            }
            matched_ips.insert(address.ip.clone());
        }
    }

    for (ip, &ttl) in ip_ttls {
        if !matched_ips.contains(ip) {
            entry.resolved_addresses.push(ResolvedAddress {
                ip: ip.clone(),
                ttl_seconds: ttl,
                last_lookup_time: now,
            });
            status_updated = true;
        }
    }

    entry.resolution_failures = 0;

    if entry.conditions.is_empty() {
        entry.conditions = vec![degraded_condition("False", ResponseCode::NoError, now)];
        status_updated = true;
    } else if entry.conditions[0].status != "False" {
        entry.conditions[0] = degraded_condition("False", ResponseCode::NoError, now);
        status_updated = true;
    }

    status_updated
}

/// Checks whether the regular-subdomain entry at `index` is fully covered by
/// the wildcard address set after the current wildcard answer is merged in:
/// the pre-existing wildcard addresses with their TTLs decayed to what
/// remains, unioned with the newly answered IPs.
fn regular_matches_wildcard(
    wildcard_entry_found: bool,
    status: &DNSNameResolverStatus,
    index: usize,
    ip_ttls: &IpTtls,
    now: DateTime<Utc>,
) -> bool {
    let mut wildcard_ip_ttls: IpTtls = IpTtls::new();

    // The wildcard entry, when it exists, is first in the list and has
    // already been visited by the walk.
    if wildcard_entry_found {
        for address in &status.resolved_names[0].resolved_addresses {
            let elapsed = (now - address.last_lookup_time).num_seconds();
            let elapsed = i32::try_from(elapsed).unwrap_or(i32::MAX);
            wildcard_ip_ttls.insert(
                address.ip.clone(),
                address.ttl_seconds.saturating_sub(elapsed),
            );
        }
    }
    for (ip, &ttl) in ip_ttls {
        wildcard_ip_ttls.insert(ip.clone(), ttl);
    }

    for address in &status.resolved_names[index].resolved_addresses {
        let Some(&ttl) = wildcard_ip_ttls.get(&address.ip) else {
            return false;
        };
        if !is_same_next_lookup_time(address.last_lookup_time, address.ttl_seconds, ttl, now) {
            return false;
        }
    }
    true
}

/// Remove the entries at the given indices with a stable compaction that
/// preserves the relative order of the survivors. The removal arithmetic
/// requires ascending indices, so they are sorted and deduplicated first.
fn remove_resolved_names(status: &mut DNSNameResolverStatus, mut indices: Vec<usize>) -> bool {
    indices.sort_unstable();
    indices.dedup();

    let mut removed = 0usize;
    for index in indices {
        status.resolved_names.remove(index - removed);
        removed += 1;
    }
    removed != 0
}

/// Append a new entry for `dns_name`. A wildcard entry goes to the front of
/// the list, a regular entry to the back.
fn add_resolved_name(
    status: &mut DNSNameResolverStatus,
    dns_name: &str,
    ip_ttls: &IpTtls,
    now: DateTime<Utc>,
) {
    let resolved_addresses = ip_ttls
        .iter()
        .map(|(ip, &ttl)| ResolvedAddress {
            ip: ip.clone(),
            ttl_seconds: ttl,
            last_lookup_time: now,
        })
        .collect();

    let entry = ResolvedName {
        dns_name: dns_name.to_string(),
        resolved_addresses,
        resolution_failures: 0,
        conditions: vec![degraded_condition("False", ResponseCode::NoError, now)],
    };

    if is_wildcard(dns_name) {
        status.resolved_names.insert(0, entry);
    } else {
        status.resolved_names.push(entry);
    }
}

/// Decide whether a failing entry is removed outright, and otherwise record
/// the failure on it. Removal requires the failure count to have reached the
/// threshold AND every address's TTL to have lapsed; a surviving entry gets
/// its expired (or nearly expired) addresses floored to the minimum TTL, its
/// failure counter incremented and its `Degraded` condition raised.
fn record_failure_on_entry(
    entry: &mut ResolvedName,
    failure_threshold: i32,
    minimum_ttl: i32,
    rcode: ResponseCode,
    now: DateTime<Utc>,
) -> (bool, bool) {
    let mut remove_entry = false;
    if entry.resolution_failures >= failure_threshold {
        remove_entry = entry
            .resolved_addresses
            .iter()
            .all(|address| address.next_lookup_time() <= now);
    }

    let mut status_updated = false;
    if !remove_entry {
        for address in &mut entry.resolved_addresses {
            let next_lookup_time =
                address.last_lookup_time + Duration::seconds(i64::from(address.ttl_seconds));
            if next_lookup_time <= now
                || is_same_next_lookup_time(address.last_lookup_time, address.ttl_seconds, 0, now)
            {
                address.ttl_seconds = minimum_ttl;
                address.last_lookup_time = now;
            }
        }

        entry.resolution_failures += 1;

        let reason = rcode_reason(rcode);
        if entry.conditions.is_empty() {
            entry.conditions = vec![degraded_condition("True", rcode, now)];
        } else if entry.conditions[0].status != "True"
            || entry.conditions[0].reason.as_deref() != Some(reason.as_str())
        {
            entry.conditions[0] = degraded_condition("True", rcode, now);
        }
        status_updated = true;
    }

    (remove_entry, status_updated)
}

fn degraded_condition(status: &str, rcode: ResponseCode, now: DateTime<Utc>) -> Condition {
    Condition {
        r#type: CONDITION_DEGRADED.to_string(),
        status: status.to_string(),
        reason: Some(rcode_reason(rcode)),
        message: Some(rcode_message(rcode)),
        last_transition_time: Some(now.to_rfc3339()),
    }
}

/// Push a successful answer into every object tracking the name, one
/// conflict-retried update per namespace, all running concurrently. Update
/// errors are logged and never surfaced to the DNS path.
pub async fn update_resolved_names_success(
    store: &dyn ResolverStore,
    objects: &NamespaceObjects,
    dns_name: &str,
    ip_ttls: &IpTtls,
) {
    let updates = objects.iter().map(|(namespace, object_name)| async move {
        let result =
            update_status_with_conflict_retry(store, namespace, object_name, |obj| {
                let spec_name = obj.spec.name.clone();
                let status = obj.status.get_or_insert_with(Default::default);
                apply_success(status, &spec_name, dns_name, ip_ttls, Utc::now())
            })
            .await;
        if let Err(err) = result {
            metrics::record_status_update_error();
            error!(
                namespace,
                object_name,
                dns_name,
                error = %err,
                "failed to update DNSNameResolver status after successful lookup"
            );
        } else {
            metrics::record_status_update_success();
        }
    });
    join_all(updates).await;
}

/// Push a failed lookup into every object tracking the name, one
/// conflict-retried update per namespace, all running concurrently. Update
/// errors are logged and never surfaced to the DNS path.
pub async fn update_resolved_names_failure(
    store: &dyn ResolverStore,
    objects: &NamespaceObjects,
    dns_name: &str,
    rcode: ResponseCode,
    failure_threshold: i32,
    minimum_ttl: i32,
) {
    let updates = objects.iter().map(|(namespace, object_name)| async move {
        let result =
            update_status_with_conflict_retry(store, namespace, object_name, |obj| {
                let status = obj.status.get_or_insert_with(Default::default);
                apply_failure(
                    status,
                    dns_name,
                    rcode,
                    failure_threshold,
                    minimum_ttl,
                    Utc::now(),
                )
            })
            .await;
        if let Err(err) = result {
            metrics::record_status_update_error();
            error!(
                namespace,
                object_name,
                dns_name,
                rcode = %rcode,
                error = %err,
                "failed to update DNSNameResolver status after failed lookup"
            );
        } else {
            metrics::record_status_update_success();
        }
    });
    join_all(updates).await;
}

#[cfg(test)]
#[path = "update_tests.rs"]
mod update_tests;

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definition for tracked DNS names.
//!
//! This module defines the `DNSNameResolver` custom resource. Each object
//! names a single DNS name to track, either a regular fully-qualified name
//! such as `www.example.com.` or a wildcard of the form `*.example.com.`,
//! and carries the observed resolution state in its status subresource.
//!
//! The status is written exclusively by the DNS-plane interceptor; the
//! operator-side controller only prunes addresses whose TTL and grace period
//! have both lapsed. Status invariants:
//!
//! - A resolved name entry for the wildcard itself, if present, is always at
//!   index 0 of `resolvedNames`.
//! - No two resolved name entries share a `dnsName`.
//! - No two resolved addresses within an entry share an IP.
//!
//! # Example
//!
//! ```yaml
//! apiVersion: resolvy.firestoned.io/v1alpha1
//! kind: DNSNameResolver
//! metadata:
//!   name: wildcard-example
//!   namespace: dns-system
//! spec:
//!   name: "*.example.com."
//! ```

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition represents an observation of a resolved name's current state.
///
/// Only one condition type is reported: `Degraded`. Its status is `True`
/// while lookups for the name are failing, with the reason and message
/// derived from the DNS rcode of the last failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition. Always `Degraded` for entries written by the interceptor.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    /// Carries the rcode mnemonic of the last lookup (e.g. `NXDOMAIN`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// A single IP address observed for a resolved name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAddress {
    /// The IP address (IPv4 or IPv6) in its canonical textual form.
    pub ip: String,

    /// TTL of the answer this address was taken from, in seconds.
    ///
    /// A zero TTL in the answer is substituted with the configured minimum
    /// TTL before being stored here.
    #[schemars(range(min = 0, max = 2_147_483_647))]
    pub ttl_seconds: i32,

    /// Time at which the answer carrying this address was observed.
    ///
    /// The next lookup for the address is due at `lastLookupTime + ttlSeconds`.
    pub last_lookup_time: DateTime<Utc>,
}

impl ResolvedAddress {
    /// The instant at which this address's TTL expires.
    #[must_use]
    pub fn next_lookup_time(&self) -> DateTime<Utc> {
        self.last_lookup_time + chrono::Duration::seconds(i64::from(self.ttl_seconds))
    }
}

/// Resolution state for one DNS name covered by a `DNSNameResolver` object.
///
/// For an object with a regular spec name there is at most one entry, for
/// the spec name itself. For a wildcard spec there may be one entry for the
/// wildcard plus one per observed matching subdomain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedName {
    /// The DNS name this entry tracks (lowercase, dot-terminated).
    pub dns_name: String,

    /// The addresses most recently observed for the name.
    #[serde(default)]
    pub resolved_addresses: Vec<ResolvedAddress>,

    /// Consecutive failed lookups since the last success.
    ///
    /// Reset to zero by any successful lookup touching this entry. Once the
    /// count reaches the configured failure threshold and every address's
    /// TTL has lapsed, the entry is removed from the status.
    #[serde(default)]
    #[schemars(range(min = 0, max = 2_147_483_647))]
    pub resolution_failures: i32,

    /// Conditions for this entry; the first is always `Degraded`.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// `DNSNameResolver` status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DNSNameResolverStatus {
    /// Observed resolution state, one entry per DNS name.
    ///
    /// The entry for a wildcard spec name, if present, is first.
    #[serde(default)]
    pub resolved_names: Vec<ResolvedName>,
}

/// `DNSNameResolver` declares a DNS name whose resolutions should be tracked.
///
/// The DNS-plane interceptor watches these objects and publishes every
/// matching A/AAAA answer it observes into the status. The operator keeps
/// the tracked names warm by issuing synthetic lookups before their TTLs
/// expire.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "resolvy.firestoned.io",
    version = "v1alpha1",
    kind = "DNSNameResolver",
    namespaced,
    shortname = "dnsnr",
    doc = "DNSNameResolver tracks the resolved addresses, TTLs and failure state of a single DNS name or wildcard.",
    printcolumn = r#"{"name":"DNSName","type":"string","jsonPath":".spec.name"}"#,
    printcolumn = r#"{"name":"Degraded","type":"string","jsonPath":".status.resolvedNames[0].conditions[0].status"}"#
)]
#[kube(status = "DNSNameResolverStatus")]
#[serde(rename_all = "camelCase")]
pub struct DNSNameResolverSpec {
    /// The DNS name to track, in lowercase dot-terminated form.
    ///
    /// A leading `*.` makes the name a wildcard matching any single-label
    /// prefix of the suffix (e.g. `*.example.com.` matches
    /// `www.example.com.`).
    #[schemars(regex(
        pattern = r"^(\*\.)?([a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?\.)+$"
    ))]
    pub name: String,
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS name classification and next-lookup-time comparison.
//!
//! All names handled here are canonical FQDNs: lowercase and dot-terminated.
//! A wildcard name starts with `*.` and covers every single-label-prefixed
//! subdomain of its suffix.

use crate::constants::NEXT_LOOKUP_TIME_MARGIN_SECS;
use chrono::{DateTime, Duration, Utc};

/// Returns true if the domain name is a wildcard. The input should be a
/// valid fqdn.
#[must_use]
pub fn is_wildcard(dns_name: &str) -> bool {
    dns_name.starts_with("*.")
}

/// Converts a regular DNS name to the wildcard covering it by replacing the
/// first label with `*`. Wildcard inputs are returned unchanged. The input
/// should be a valid fqdn.
#[must_use]
pub fn wildcard_of(dns_name: &str) -> String {
    if is_wildcard(dns_name) {
        return dns_name.to_string();
    }
    match dns_name.find('.') {
        Some(index) => format!("*{}", &dns_name[index..]),
        None => dns_name.to_string(),
    }
}

/// Lowercases a query name and ensures the trailing dot, producing the
/// canonical form used as the key of the name indexes and of the status
/// entries.
#[must_use]
pub fn canonical_fqdn(name: &str) -> String {
    let lower = name.to_lowercase();
    if lower.ends_with('.') {
        lower
    } else {
        format!("{lower}.")
    }
}

/// Checks if the existing next lookup time (existing last lookup time +
/// existing ttl) and the current next lookup time (`now` + current ttl) are
/// within the 5 second margin of each other.
///
/// The margin keeps answer jitter from forcing a status write on every
/// query for a name whose TTL has not meaningfully moved.
#[must_use]
pub fn is_same_next_lookup_time(
    existing_last_lookup_time: DateTime<Utc>,
    existing_ttl: i32,
    current_ttl: i32,
    now: DateTime<Utc>,
) -> bool {
    let existing_next = existing_last_lookup_time + Duration::seconds(i64::from(existing_ttl));
    let current_next = now + Duration::seconds(i64::from(current_ttl));
    let delta = (existing_next - current_next).num_seconds().abs();
    delta <= NEXT_LOOKUP_TIME_MARGIN_SECS
}

#[cfg(test)]
#[path = "dns_names_tests.rs"]
mod dns_names_tests;

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the grace-period predicates.

use super::*;
use crate::crd::{ResolvedAddress, ResolvedName};

fn address(ip: &str, ttl: i32, age_seconds: i64) -> ResolvedAddress {
    ResolvedAddress {
        ip: ip.to_string(),
        ttl_seconds: ttl,
        last_lookup_time: Utc::now() - Duration::seconds(age_seconds),
    }
}

fn status(entries: Vec<(&str, Vec<ResolvedAddress>)>) -> DNSNameResolverStatus {
    DNSNameResolverStatus {
        resolved_names: entries
            .into_iter()
            .map(|(dns_name, resolved_addresses)| ResolvedName {
                dns_name: dns_name.to_string(),
                resolved_addresses,
                ..ResolvedName::default()
            })
            .collect(),
    }
}

fn ips_of(status: &DNSNameResolverStatus, index: usize) -> Vec<&str> {
    status.resolved_names[index]
        .resolved_addresses
        .iter()
        .map(|address| address.ip.as_str())
        .collect()
}

#[test]
fn test_no_removal_while_ttls_are_valid() {
    let now = Utc::now();
    let mut current = status(vec![
        (
            "*.example.com.",
            vec![address("1.1.1.1", 10, 0), address("1.1.1.2", 8, 0)],
        ),
        ("www.example.com.", vec![address("1.1.1.3", 30, 0)]),
    ]);
    let before = current.clone();

    assert!(!removal_of_ips_required(&mut current, now));
    assert_eq!(current, before);
}

#[test]
fn test_no_removal_while_grace_not_elapsed() {
    let now = Utc::now();
    let mut current = status(vec![
        (
            "*.example.com.",
            vec![address("1.1.1.1", 10, 12), address("1.1.1.2", 8, 12)],
        ),
        ("www.example.com.", vec![address("1.1.1.3", 30, 12)]),
    ]);
    let before = current.clone();

    // TTLs expired, but every address is still within the 5s grace.
    assert!(!removal_of_ips_required(&mut current, now));
    assert_eq!(current, before);
}

#[test]
fn test_addresses_past_grace_are_removed() {
    let now = Utc::now();
    let mut current = status(vec![
        (
            "*.example.com.",
            vec![address("1.1.1.1", 10, 14), address("1.1.1.2", 8, 14)],
        ),
        ("www.example.com.", vec![address("1.1.1.3", 30, 14)]),
    ]);

    // 1.1.1.2 expired 6s ago and its 5s grace is over; the others survive.
    assert!(removal_of_ips_required(&mut current, now));
    assert_eq!(ips_of(&current, 0), vec!["1.1.1.1"]);
    assert_eq!(ips_of(&current, 1), vec!["1.1.1.3"]);
}

#[test]
fn test_reconcile_required_single_expired_address() {
    let now = Utc::now();
    let current = status(vec![
        ("*.example.com.", vec![address("1.1.1.1", 10, 0)]),
        ("www.example.com.", vec![address("1.1.1.2", 4, 5)]),
    ]);

    // Expired one second ago: four seconds of grace remain.
    let (ttl_expired, remaining) = reconcile_required(&current, now);
    assert!(ttl_expired);
    let millis = remaining.num_milliseconds();
    assert!((3900..=4100).contains(&millis), "remaining {millis}ms");
}

#[test]
fn test_reconcile_required_returns_minimum_remaining_time() {
    let now = Utc::now();
    let current = status(vec![
        ("*.example.com.", vec![address("1.1.1.1", 10, 12)]),
        ("www.example.com.", vec![address("1.1.1.2", 4, 5)]),
    ]);

    // Graces run out in 3s and 4s; the earlier boundary wins.
    let (ttl_expired, remaining) = reconcile_required(&current, now);
    assert!(ttl_expired);
    let millis = remaining.num_milliseconds();
    assert!((2900..=3100).contains(&millis), "remaining {millis}ms");
}

#[test]
fn test_reconcile_not_required_without_expired_ttls() {
    let now = Utc::now();
    let current = status(vec![
        ("*.example.com.", vec![address("1.1.1.1", 10, 0)]),
        ("www.example.com.", vec![address("1.1.1.2", 4, 0)]),
    ]);

    let (ttl_expired, remaining) = reconcile_required(&current, now);
    assert!(!ttl_expired);
    assert_eq!(remaining, Duration::zero());
}

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for DNS name classification helpers.

use super::*;

#[test]
fn test_is_wildcard() {
    assert!(is_wildcard("*.example.com."));
    assert!(is_wildcard("*.sub1.example.com."));
    assert!(!is_wildcard("www.example.com."));
    assert!(!is_wildcard("sub2.sub1.example.com."));
}

#[test]
fn test_wildcard_of_regular_name() {
    assert_eq!(wildcard_of("a.b.c."), "*.b.c.");
    assert_eq!(wildcard_of("www.example.com."), "*.example.com.");
}

#[test]
fn test_wildcard_of_wildcard_is_identity() {
    assert_eq!(wildcard_of("*.b.c."), "*.b.c.");
    assert_eq!(wildcard_of("*.example.com."), "*.example.com.");
}

#[test]
fn test_canonical_fqdn() {
    assert_eq!(canonical_fqdn("WWW.Example.COM"), "www.example.com.");
    assert_eq!(canonical_fqdn("www.example.com."), "www.example.com.");
    assert_eq!(canonical_fqdn("*.Example.com"), "*.example.com.");
}

#[test]
fn test_same_next_lookup_time_within_margin() {
    let now = Utc::now();
    // Existing: looked up 10s ago with a 40s TTL -> due in 30s.
    // Current answer: 30s TTL -> due in 30s. Identical.
    assert!(is_same_next_lookup_time(
        now - Duration::seconds(10),
        40,
        30,
        now
    ));
    // 4 seconds of drift stays inside the 5s margin.
    assert!(is_same_next_lookup_time(
        now - Duration::seconds(14),
        40,
        30,
        now
    ));
}

#[test]
fn test_same_next_lookup_time_outside_margin() {
    let now = Utc::now();
    // Existing due in 24s vs current due in 30s: 6s apart.
    assert!(!is_same_next_lookup_time(
        now - Duration::seconds(16),
        40,
        30,
        now
    ));
    // Freshly expired address vs a 30s answer.
    assert!(!is_same_next_lookup_time(
        now - Duration::seconds(40),
        40,
        30,
        now
    ));
}

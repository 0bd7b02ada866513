// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the lookup scheduler.

use super::*;
use crate::crd::ResolvedAddress;
use std::time::Duration as StdDuration;

/// Records lookup requests instead of querying anything.
#[derive(Default)]
struct StubLookup {
    calls: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl NameLookup for StubLookup {
    async fn lookup(&self, dns_name: &str, num_ips: usize) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((dns_name.to_string(), num_ips));
        Ok(())
    }
}

fn address(ip: &str, ttl: i32) -> ResolvedAddress {
    ResolvedAddress {
        ip: ip.to_string(),
        ttl_seconds: ttl,
        last_lookup_time: Utc::now(),
    }
}

fn assert_close(actual: DateTime<Utc>, expected: DateTime<Utc>) {
    let delta = (actual - expected).num_milliseconds().abs();
    assert!(delta <= 1000, "expected {expected}, got {actual}");
}

#[tokio::test]
async fn test_add_and_delete_regular_object() {
    let resolver = Resolver::new(Arc::new(StubLookup::default()));

    resolver.add(
        "www.example.com.",
        &[address("1.1.1.1", 10)],
        true,
        "regular",
    );

    let (dns_name, next_lookup_time, num_ips) = resolver.next_dns_name_details().unwrap();
    assert_eq!(dns_name, "www.example.com.");
    assert_eq!(num_ips, 1);
    assert_close(next_lookup_time, Utc::now() + chrono::Duration::seconds(10));

    resolver.delete("regular");
    assert!(resolver.next_dns_name_details().is_none());
}

#[tokio::test]
async fn test_wildcard_object_tracks_many_names() {
    let resolver = Resolver::new(Arc::new(StubLookup::default()));

    resolver.add(
        "*.example.com.",
        &[address("1.1.1.2", 8), address("1.1.1.3", 8)],
        false,
        "wildcard",
    );
    resolver.add(
        "www.example.com.",
        &[address("1.1.1.1", 10)],
        false,
        "wildcard",
    );

    // The wildcard name expires first.
    let (dns_name, _, num_ips) = resolver.next_dns_name_details().unwrap();
    assert_eq!(dns_name, "*.example.com.");
    assert_eq!(num_ips, 2);

    // Deleting the object forgets every name observed under it.
    resolver.delete("wildcard");
    assert!(resolver.next_dns_name_details().is_none());
}

#[tokio::test]
async fn test_add_without_addresses_spawns_first_lookup() {
    let lookup = Arc::new(StubLookup::default());
    let resolver = Resolver::new(Arc::clone(&lookup) as Arc<dyn NameLookup>);

    resolver.add("www.example.com.", &[], true, "regular");

    let (dns_name, next_lookup_time, num_ips) = resolver.next_dns_name_details().unwrap();
    assert_eq!(dns_name, "www.example.com.");
    assert_eq!(num_ips, 0);
    assert_close(
        next_lookup_time,
        Utc::now() + chrono::Duration::seconds(DEFAULT_MAX_TTL_SECS as i64),
    );

    // The first lookup runs on a spawned task; give it a moment.
    let mut looked_up = false;
    for _ in 0..100 {
        if lookup.calls.lock().unwrap().as_slice() == [("www.example.com.".to_string(), 0)] {
            looked_up = true;
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    assert!(looked_up, "expected an immediate first lookup");
}

#[tokio::test]
async fn test_readd_without_addresses_keeps_schedule() {
    let resolver = Resolver::new(Arc::new(StubLookup::default()));

    resolver.add("www.example.com.", &[address("1.1.1.1", 10)], true, "regular");
    let (_, before, _) = resolver.next_dns_name_details().unwrap();

    // An update without addresses does not rearm an existing entry.
    resolver.add("www.example.com.", &[], true, "regular");
    let (_, after, num_ips) = resolver.next_dns_name_details().unwrap();
    assert_eq!(before, after);
    assert_eq!(num_ips, 0);
}

#[tokio::test]
async fn test_inconsistent_add_is_rejected() {
    let resolver = Resolver::new(Arc::new(StubLookup::default()));

    resolver.add("www.example.com.", &[address("1.1.1.1", 10)], true, "owner");
    // A different object claiming the same regular name is ignored.
    resolver.add(
        "www.example.com.",
        &[address("2.2.2.2", 600)],
        true,
        "intruder",
    );

    let (dns_name, next_lookup_time, num_ips) = resolver.next_dns_name_details().unwrap();
    assert_eq!(dns_name, "www.example.com.");
    assert_eq!(num_ips, 1);
    assert_close(next_lookup_time, Utc::now() + chrono::Duration::seconds(10));

    // The intruder never registered, so its delete changes nothing.
    resolver.delete("intruder");
    assert!(resolver.next_dns_name_details().is_some());
}

#[tokio::test]
async fn test_delete_of_shared_name_waits_for_both_owners() {
    let resolver = Resolver::new(Arc::new(StubLookup::default()));

    resolver.add("www.example.com.", &[address("1.1.1.1", 10)], true, "regular");
    resolver.add("www.example.com.", &[address("1.1.1.1", 10)], false, "wildcard");

    resolver.delete("regular");
    // The wildcard object still references the name.
    assert!(resolver.next_dns_name_details().is_some());

    resolver.delete("wildcard");
    assert!(resolver.next_dns_name_details().is_none());
}

#[test]
fn test_time_till_next_lookup_clamping() {
    let max_ttl = StdDuration::from_secs(DEFAULT_MAX_TTL_SECS);

    // No tracked name waits the maximum TTL.
    assert_eq!(
        get_time_till_next_lookup(false, chrono::Duration::seconds(1)),
        max_ttl
    );
    // More than the maximum TTL remaining is clamped down to it.
    assert_eq!(
        get_time_till_next_lookup(true, chrono::Duration::seconds(3600)),
        max_ttl
    );
    // A lapsed deadline re-arms at twice the lookup timeout.
    assert_eq!(
        get_time_till_next_lookup(true, chrono::Duration::seconds(0)),
        StdDuration::from_secs(2 * LOOKUP_TIMEOUT_SECS)
    );
    assert_eq!(
        get_time_till_next_lookup(true, chrono::Duration::seconds(-30)),
        StdDuration::from_secs(2 * LOOKUP_TIMEOUT_SECS)
    );
    // An in-range remaining duration is used as-is.
    assert_eq!(
        get_time_till_next_lookup(true, chrono::Duration::seconds(90)),
        StdDuration::from_secs(90)
    );
}

#[tokio::test]
async fn test_timer_task_looks_up_expiring_name() {
    let lookup = Arc::new(StubLookup::default());
    let resolver = Arc::new(Resolver::new(Arc::clone(&lookup) as Arc<dyn NameLookup>));
    resolver.start();

    // One address, expiring in one second.
    resolver.add("www.example.com.", &[address("1.1.1.1", 1)], true, "regular");

    let mut looked_up = false;
    for _ in 0..300 {
        if lookup
            .calls
            .lock()
            .unwrap()
            .iter()
            .any(|(name, num_ips)| name == "www.example.com." && *num_ips == 1)
        {
            looked_up = true;
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    assert!(looked_up, "expected the timer task to look the name up");
}

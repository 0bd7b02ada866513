// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the conflict-retry policy.

use super::*;
use crate::crd::{DNSNameResolver, DNSNameResolverSpec, DNSNameResolverStatus, ResolvedName};
use crate::store::memory::MemoryStore;
use kube::api::ObjectMeta;
use std::sync::atomic::Ordering;

fn tracked_object(namespace: &str, name: &str) -> DNSNameResolver {
    DNSNameResolver {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        spec: DNSNameResolverSpec {
            name: "www.example.com.".to_string(),
        },
        status: None,
    }
}

fn mark_status(obj: &mut DNSNameResolver) -> bool {
    obj.status = Some(DNSNameResolverStatus {
        resolved_names: vec![ResolvedName {
            dns_name: "www.example.com.".to_string(),
            ..ResolvedName::default()
        }],
    });
    true
}

#[test]
fn test_backoff_is_bounded() {
    let mut backoff = conflict_backoff();
    let mut steps = 0;
    while backoff.next_backoff().is_some() {
        steps += 1;
    }
    assert_eq!(steps, crate::constants::CONFLICT_RETRY_STEPS);
}

#[test]
fn test_backoff_grows_exponentially() {
    let mut backoff = conflict_backoff();
    let first = backoff.next_backoff().unwrap();
    let second = backoff.next_backoff().unwrap();
    let third = backoff.next_backoff().unwrap();

    // ±10% jitter around 10ms, 20ms and 40ms.
    assert!(first >= Duration::from_millis(9) && first <= Duration::from_millis(11));
    assert!(second >= Duration::from_millis(18) && second <= Duration::from_millis(22));
    assert!(third >= Duration::from_millis(36) && third <= Duration::from_millis(44));
}

#[tokio::test]
async fn test_noop_mutation_skips_the_rpc() {
    let store = MemoryStore::with_object("ns1", tracked_object("ns1", "regular"));

    update_status_with_conflict_retry(&store, "ns1", "regular", |_| false)
        .await
        .unwrap();

    assert_eq!(store.update_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_update_applies_mutation() {
    let store = MemoryStore::with_object("ns1", tracked_object("ns1", "regular"));

    update_status_with_conflict_retry(&store, "ns1", "regular", mark_status)
        .await
        .unwrap();

    let stored = store.get("ns1", "regular").unwrap();
    assert_eq!(stored.status.unwrap().resolved_names.len(), 1);
    assert_eq!(store.update_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_conflicts_are_retried() {
    let store = MemoryStore::with_object("ns1", tracked_object("ns1", "regular"));
    store.conflicts_to_inject.store(2, Ordering::SeqCst);

    update_status_with_conflict_retry(&store, "ns1", "regular", mark_status)
        .await
        .unwrap();

    assert_eq!(store.update_calls.load(Ordering::SeqCst), 3);
    assert!(store.get("ns1", "regular").unwrap().status.is_some());
}

#[tokio::test]
async fn test_conflict_budget_is_bounded() {
    let store = MemoryStore::with_object("ns1", tracked_object("ns1", "regular"));
    store.conflicts_to_inject.store(usize::MAX, Ordering::SeqCst);

    let error = update_status_with_conflict_retry(&store, "ns1", "regular", mark_status)
        .await
        .unwrap_err();

    assert!(error.is_conflict());
    // The initial attempt plus one per backoff step.
    assert_eq!(
        store.update_calls.load(Ordering::SeqCst),
        1 + crate::constants::CONFLICT_RETRY_STEPS as usize
    );
}

#[tokio::test]
async fn test_missing_object_surfaces_error() {
    let store = MemoryStore::default();

    let error = update_status_with_conflict_retry(&store, "ns1", "ghost", mark_status)
        .await
        .unwrap_err();

    assert!(!error.is_conflict());
    assert_eq!(store.update_calls.load(Ordering::SeqCst), 0);
}

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory index of tracked DNS names.
//!
//! Maps every tracked name to the `DNSNameResolver` objects covering it:
//! `FQDN -> namespace -> object name`, split into a regular and a wildcard
//! sub-index so that disjoint name families can be mutated in parallel.
//! The index is maintained from watch events and read on every intercepted
//! query, so operations are constant-time and hold their lock only for the
//! map mutation itself.

use crate::dns_names::{is_wildcard, wildcard_of};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;

/// Mapping from namespace to the `DNSNameResolver` object name tracking a
/// DNS name in that namespace.
pub type NamespaceObjects = HashMap<String, String>;

/// The two-family name index.
#[derive(Default)]
pub struct NameIndex {
    regular: Mutex<HashMap<String, NamespaceObjects>>,
    wildcard: Mutex<HashMap<String, NamespaceObjects>>,
}

impl NameIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `object_name` in `namespace` tracks `dns_name`.
    ///
    /// First write wins: if the (name, namespace) pair is already claimed by
    /// a different object the insert is rejected, guaranteeing a namespace
    /// admits only one tracked object per FQDN. Returns whether the entry
    /// was accepted (re-inserting the same triple is accepted as a no-op).
    pub fn insert(&self, dns_name: &str, namespace: &str, object_name: &str) -> bool {
        let lock = if is_wildcard(dns_name) {
            &self.wildcard
        } else {
            &self.regular
        };
        let mut index = lock.lock().unwrap();
        let objects = index.entry(dns_name.to_string()).or_default();
        match objects.get(namespace) {
            Some(existing) if existing != object_name => {
                warn!(
                    dns_name,
                    namespace,
                    object_name,
                    existing_object = %existing,
                    "rejecting DNSNameResolver for an already tracked name"
                );
                false
            }
            Some(_) => true,
            None => {
                objects.insert(namespace.to_string(), object_name.to_string());
                true
            }
        }
    }

    /// Remove the entry for the exact (name, namespace, object) triple,
    /// compacting the inner map when it becomes empty.
    pub fn remove(&self, dns_name: &str, namespace: &str, object_name: &str) {
        let lock = if is_wildcard(dns_name) {
            &self.wildcard
        } else {
            &self.regular
        };
        let mut index = lock.lock().unwrap();
        if let Some(objects) = index.get_mut(dns_name) {
            if objects.get(namespace).map(String::as_str) == Some(object_name) {
                objects.remove(namespace);
            }
            if objects.is_empty() {
                index.remove(dns_name);
            }
        }
    }

    /// The objects tracking `dns_name` as a regular name, if any.
    #[must_use]
    pub fn regular_objects(&self, dns_name: &str) -> Option<NamespaceObjects> {
        self.regular.lock().unwrap().get(dns_name).cloned()
    }

    /// The objects tracking `dns_name` as a wildcard, if any.
    #[must_use]
    pub fn wildcard_objects(&self, dns_name: &str) -> Option<NamespaceObjects> {
        self.wildcard.lock().unwrap().get(dns_name).cloned()
    }

    /// Classify a query name and return the regular and wildcard hits.
    ///
    /// A wildcard query can only hit the wildcard index; a regular query is
    /// looked up exactly and as a subdomain of its covering wildcard.
    #[must_use]
    pub fn lookup(&self, qname: &str) -> (Option<NamespaceObjects>, Option<NamespaceObjects>) {
        if is_wildcard(qname) {
            (None, self.wildcard_objects(qname))
        } else {
            (
                self.regular_objects(qname),
                self.wildcard_objects(&wildcard_of(qname)),
            )
        }
    }
}

#[cfg(test)]
#[path = "index_tests.rs"]
mod index_tests;

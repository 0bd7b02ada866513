// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Store adaptor for `DNSNameResolver` objects.
//!
//! Both halves of the engine read and write CRs through the [`ResolverStore`]
//! trait: a cached read (backed by a reflector store on the DNS plane), a
//! live read that bypasses the cache, and a resourceVersion-checked status
//! update. Keeping the contract behind a trait lets the status-update logic
//! run against an in-memory double in tests.

use crate::crd::DNSNameResolver;
use async_trait::async_trait;
use kube::api::PostParams;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Api, Client, ResourceExt};
use thiserror::Error;

/// Errors surfaced by the store adaptor.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The object is not present in the local cache.
    #[error("DNSNameResolver {namespace}/{name} not found in the local cache")]
    NotCached {
        /// Namespace of the object.
        namespace: String,
        /// Name of the object.
        name: String,
    },

    /// The status update lost an optimistic-concurrency race.
    #[error("conflicting status update for DNSNameResolver {namespace}/{name}")]
    Conflict {
        /// Namespace of the object.
        namespace: String,
        /// Name of the object.
        name: String,
    },

    /// Failure serializing the object for the update call.
    #[error("failed to serialize DNSNameResolver status")]
    Serialization(#[from] serde_json::Error),

    /// Any other Kubernetes API error.
    #[error(transparent)]
    Api(#[from] kube::Error),
}

impl StoreError {
    /// Whether the error is an optimistic-concurrency conflict and the
    /// read-modify-write cycle should be retried.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Conflict { .. } => true,
            Self::Api(kube::Error::Api(response)) => response.code == 409,
            _ => false,
        }
    }
}

/// Read and update access to `DNSNameResolver` objects.
#[async_trait]
pub trait ResolverStore: Send + Sync {
    /// Fetch an object from the local cache.
    fn cached(&self, namespace: &str, name: &str) -> Result<DNSNameResolver, StoreError>;

    /// Fetch an object live from the apiserver, bypassing the cache.
    async fn live(&self, namespace: &str, name: &str) -> Result<DNSNameResolver, StoreError>;

    /// Replace the status subresource of an object. The update carries the
    /// object's resourceVersion; a stale version yields a conflict error.
    async fn update_status(
        &self,
        namespace: &str,
        obj: &DNSNameResolver,
    ) -> Result<DNSNameResolver, StoreError>;
}

/// Store adaptor backed by a reflector cache plus a Kubernetes client.
///
/// The cache is populated by the plugin's watch task; reads served from it
/// cost no API round trip, which matters on the DNS hot path.
pub struct KubeResolverStore {
    client: Client,
    cache: Store<DNSNameResolver>,
}

impl KubeResolverStore {
    /// Create a store adaptor from a client and a reflector store reader.
    #[must_use]
    pub fn new(client: Client, cache: Store<DNSNameResolver>) -> Self {
        Self { client, cache }
    }

    fn api(&self, namespace: &str) -> Api<DNSNameResolver> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ResolverStore for KubeResolverStore {
    fn cached(&self, namespace: &str, name: &str) -> Result<DNSNameResolver, StoreError> {
        let key = ObjectRef::new(name).within(namespace);
        self.cache
            .get(&key)
            .map(|obj| (*obj).clone())
            .ok_or_else(|| StoreError::NotCached {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn live(&self, namespace: &str, name: &str) -> Result<DNSNameResolver, StoreError> {
        Ok(self.api(namespace).get(name).await?)
    }

    async fn update_status(
        &self,
        namespace: &str,
        obj: &DNSNameResolver,
    ) -> Result<DNSNameResolver, StoreError> {
        let name = obj.name_any();
        let data = serde_json::to_vec(obj)?;
        Ok(self
            .api(namespace)
            .replace_status(&name, &PostParams::default(), data)
            .await?)
    }
}

/// Store adaptor without a local cache, used by the operator-side controller
/// where every reconcile already starts from a fresh read.
///
/// `cached` always misses so the retry loop falls through to live reads.
pub struct ApiResolverStore {
    client: Client,
}

impl ApiResolverStore {
    /// Create a cacheless store adaptor from a client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResolverStore for ApiResolverStore {
    fn cached(&self, namespace: &str, name: &str) -> Result<DNSNameResolver, StoreError> {
        Err(StoreError::NotCached {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    async fn live(&self, namespace: &str, name: &str) -> Result<DNSNameResolver, StoreError> {
        let api: Api<DNSNameResolver> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn update_status(
        &self,
        namespace: &str,
        obj: &DNSNameResolver,
    ) -> Result<DNSNameResolver, StoreError> {
        let api: Api<DNSNameResolver> = Api::namespaced(self.client.clone(), namespace);
        let name = obj.name_any();
        let data = serde_json::to_vec(obj)?;
        Ok(api
            .replace_status(&name, &PostParams::default(), data)
            .await?)
    }
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-memory store double with resourceVersion semantics, for tests.

    use super::{DNSNameResolver, ResolverStore, StoreError};
    use async_trait::async_trait;
    use kube::ResourceExt;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// A `ResolverStore` kept entirely in memory. `update_status` enforces
    /// resourceVersion matching the stored object and bumps the version on
    /// success, so conflict-retry behavior can be exercised without an
    /// apiserver. `conflicts_to_inject` forces the next N updates to fail
    /// with a conflict regardless of versions.
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        objects: Mutex<HashMap<(String, String), DNSNameResolver>>,
        pub(crate) conflicts_to_inject: AtomicUsize,
        pub(crate) update_calls: AtomicUsize,
    }

    impl MemoryStore {
        pub(crate) fn with_object(namespace: &str, obj: DNSNameResolver) -> Self {
            let store = Self::default();
            store.put(namespace, obj);
            store
        }

        pub(crate) fn put(&self, namespace: &str, mut obj: DNSNameResolver) {
            if obj.metadata.resource_version.is_none() {
                obj.metadata.resource_version = Some("1".to_string());
            }
            let key = (namespace.to_string(), obj.name_any());
            self.objects.lock().unwrap().insert(key, obj);
        }

        pub(crate) fn get(&self, namespace: &str, name: &str) -> Option<DNSNameResolver> {
            let key = (namespace.to_string(), name.to_string());
            self.objects.lock().unwrap().get(&key).cloned()
        }
    }

    #[async_trait]
    impl ResolverStore for MemoryStore {
        fn cached(&self, namespace: &str, name: &str) -> Result<DNSNameResolver, StoreError> {
            self.get(namespace, name).ok_or_else(|| StoreError::NotCached {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
        }

        async fn live(&self, namespace: &str, name: &str) -> Result<DNSNameResolver, StoreError> {
            self.cached(namespace, name)
        }

        async fn update_status(
            &self,
            namespace: &str,
            obj: &DNSNameResolver,
        ) -> Result<DNSNameResolver, StoreError> {
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            let name = obj.name_any();
            let conflict = StoreError::Conflict {
                namespace: namespace.to_string(),
                name: name.clone(),
            };
            if self
                .conflicts_to_inject
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(conflict);
            }
            let key = (namespace.to_string(), name.clone());
            let mut objects = self.objects.lock().unwrap();
            let Some(current) = objects.get_mut(&key) else {
                return Err(StoreError::NotCached {
                    namespace: namespace.to_string(),
                    name,
                });
            };
            if current.metadata.resource_version != obj.metadata.resource_version {
                return Err(conflict);
            }
            let next_version = current
                .metadata
                .resource_version
                .as_deref()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or_default()
                + 1;
            let mut updated = obj.clone();
            updated.metadata.resource_version = Some(next_version.to_string());
            *current = updated.clone();
            Ok(updated)
        }
    }
}

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Random sampling of ready CoreDNS pod IPs.
//!
//! Synthetic lookups are spread over up to `k` pods. The sampler lists the
//! endpoint slices of the CoreDNS service, keeps the addresses of endpoints
//! not explicitly marked unready, and picks `k` distinct addresses uniformly
//! at random.

use anyhow::{bail, Result};
use async_trait::async_trait;
use k8s_openapi::api::discovery::v1::EndpointSlice;
use kube::api::ListParams;
use kube::{Api, Client};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Label selector key connecting an endpoint slice to its service.
const SERVICE_NAME_LABEL: &str = "kubernetes.io/service-name";

/// Source of endpoint slices for the CoreDNS service.
#[async_trait]
pub trait EndpointSliceLister: Send + Sync {
    /// List the endpoint slices backing the service.
    async fn list_endpoint_slices(&self) -> Result<Vec<EndpointSlice>>;
}

/// Lister backed by the Kubernetes API, scoped to the CoreDNS namespace and
/// filtered on the service-name label.
pub struct KubeEndpointSliceLister {
    api: Api<EndpointSlice>,
    service_name: String,
}

impl KubeEndpointSliceLister {
    /// Create a lister for the endpoint slices of `service_name` in
    /// `namespace`.
    #[must_use]
    pub fn new(client: Client, namespace: &str, service_name: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            service_name: service_name.to_string(),
        }
    }
}

#[async_trait]
impl EndpointSliceLister for KubeEndpointSliceLister {
    async fn list_endpoint_slices(&self) -> Result<Vec<EndpointSlice>> {
        let params =
            ListParams::default().labels(&format!("{SERVICE_NAME_LABEL}={}", self.service_name));
        let list = self.api.list(&params).await?;
        Ok(list.items)
    }
}

/// Picks up to `k` random ready CoreDNS pod IPs.
pub struct PodIpSampler {
    lister: Arc<dyn EndpointSliceLister>,
}

impl PodIpSampler {
    /// Create a sampler over the given lister.
    #[must_use]
    pub fn new(lister: Arc<dyn EndpointSliceLister>) -> Self {
        Self { lister }
    }

    /// Return up to `max_ips` distinct pod IPs chosen uniformly at random.
    ///
    /// # Errors
    ///
    /// Fails when the endpoint slice listing fails or no ready pod IP is
    /// available.
    pub async fn random_pod_ips(&self, max_ips: usize) -> Result<Vec<String>> {
        let slices = self.lister.list_endpoint_slices().await?;

        let mut ips = Vec::new();
        for slice in slices {
            for endpoint in slice.endpoints {
                // Endpoints are skipped only when readiness is reported and
                // explicitly false.
                if let Some(conditions) = &endpoint.conditions {
                    if conditions.ready == Some(false) {
                        continue;
                    }
                }
                ips.extend(endpoint.addresses);
            }
        }

        if ips.is_empty() {
            bail!("no ips found for the coredns pods");
        }

        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or_default();
        let mut rng = StdRng::seed_from_u64(seed);
        Ok(sample_ips(ips, max_ips, &mut rng))
    }
}

/// Pick `max_ips` distinct elements without replacement by swapping each
/// chosen element to the tail. Lists no larger than `max_ips` are returned
/// whole.
pub(crate) fn sample_ips(mut ips: Vec<String>, max_ips: usize, rng: &mut impl Rng) -> Vec<String> {
    if ips.len() <= max_ips {
        return ips;
    }

    let mut random_ips = Vec::with_capacity(max_ips);
    for _ in 0..max_ips {
        let index = rng.gen_range(0..ips.len());
        random_ips.push(ips.swap_remove(index));
    }
    random_ips
}

#[cfg(test)]
#[path = "sampler_tests.rs"]
mod sampler_tests;

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # Resolvy - DNS name resolution tracking for Kubernetes
//!
//! Resolvy reconciles declarative `DNSNameResolver` custom resources with
//! the DNS answers actually observed by the cluster's recursive resolver.
//! Each object names a single FQDN or a `*.`-prefixed wildcard; its status
//! carries the resolved A/AAAA addresses, their TTLs, a failure counter and
//! a `Degraded` condition.
//!
//! The engine has two collaborating halves that share the CR model but not
//! a process:
//!
//! - [`plugin`] - the **interceptor**, a handler installed in the recursive
//!   resolver's chain. It delegates every query downstream, and publishes
//!   the answers for tracked names into the matching objects' status.
//! - [`controller`] - the **operator side**: a TTL scheduler that keeps
//!   tracked names live by issuing synthetic lookups before their TTLs
//!   expire, and a reconciler that prunes addresses past their grace period.
//!
//! ## Modules
//!
//! - [`crd`] - the `DNSNameResolver` custom resource
//! - [`plugin`] - interceptor, chain contract, name index, status updates
//! - [`controller`] - reconciler, lookup scheduler, pod-IP sampler
//! - [`store`] - list/get/updateStatus contract against the object store
//! - [`retry`] - optimistic-concurrency retry policy
//! - [`dns_names`] - FQDN classification helpers
//! - [`rcode`] - rcode to condition reason/message mapping
//! - [`metrics`] - Prometheus metrics

pub mod constants;
pub mod controller;
pub mod crd;
pub mod dns_names;
pub mod metrics;
pub mod plugin;
pub mod rcode;
pub mod retry;
pub mod store;

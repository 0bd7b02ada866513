// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the resolvy engine.
//!
//! All metrics live under the `resolvy_firestoned_io` namespace (the
//! prometheus-safe form of `resolvy.firestoned.io`) and are registered in a
//! single global registry exposed by the operator's `/metrics` endpoint.

use prometheus::{CounterVec, Encoder, Opts, Registry, TextEncoder};
use std::sync::LazyLock;

/// Namespace prefix for all resolvy metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "resolvy_firestoned_io";

/// Global Prometheus metrics registry.
///
/// All metrics are registered in this registry and exposed via the
/// `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Total number of DNSNameResolver status updates by result.
///
/// Labels:
/// - `result`: `success` or `error`
static STATUS_UPDATES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let counter = CounterVec::new(
        Opts::new(
            format!("{METRICS_NAMESPACE}_status_updates_total"),
            "Total number of DNSNameResolver status updates by result",
        ),
        &["result"],
    )
    .expect("valid metric definition");
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric registered once");
    counter
});

/// Total number of synthetic DNS lookups by result.
///
/// Labels:
/// - `result`: `success` or `error`
static SYNTHETIC_LOOKUPS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let counter = CounterVec::new(
        Opts::new(
            format!("{METRICS_NAMESPACE}_synthetic_lookups_total"),
            "Total number of synthetic DNS lookups by result",
        ),
        &["result"],
    )
    .expect("valid metric definition");
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric registered once");
    counter
});

/// Total number of controller reconciliations by outcome.
///
/// Labels:
/// - `status`: `success`, `deleted` or `error`
static RECONCILIATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let counter = CounterVec::new(
        Opts::new(
            format!("{METRICS_NAMESPACE}_reconciliations_total"),
            "Total number of controller reconciliations by outcome",
        ),
        &["status"],
    )
    .expect("valid metric definition");
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric registered once");
    counter
});

/// Record a successful status update.
pub fn record_status_update_success() {
    STATUS_UPDATES_TOTAL.with_label_values(&["success"]).inc();
}

/// Record a failed status update.
pub fn record_status_update_error() {
    STATUS_UPDATES_TOTAL.with_label_values(&["error"]).inc();
}

/// Record a completed synthetic lookup.
pub fn record_synthetic_lookup_success() {
    SYNTHETIC_LOOKUPS_TOTAL
        .with_label_values(&["success"])
        .inc();
}

/// Record a failed synthetic lookup.
pub fn record_synthetic_lookup_error() {
    SYNTHETIC_LOOKUPS_TOTAL.with_label_values(&["error"]).inc();
}

/// Record a reconciliation outcome.
pub fn record_reconciliation(status: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[status]).inc();
}

/// Gather all registered metrics in the Prometheus text format.
///
/// # Errors
///
/// Returns an error when encoding the metric families fails.
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

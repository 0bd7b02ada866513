// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the resolvy plugin and operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for the `DNSNameResolver` CRD
pub const API_GROUP: &str = "resolvy.firestoned.io";

/// API version for the `DNSNameResolver` CRD
pub const API_VERSION: &str = "v1alpha1";

/// Kind name for the `DNSNameResolver` resource
pub const KIND_DNS_NAME_RESOLVER: &str = "DNSNameResolver";

/// Condition type reported on every resolved name
pub const CONDITION_DEGRADED: &str = "Degraded";

// ============================================================================
// DNS Plane Constants
// ============================================================================

/// Name under which the interceptor registers in the resolver handler chain
pub const PLUGIN_NAME: &str = "ocp_dnsnameresolver";

/// Standard DNS service port on CoreDNS pods
pub const DNS_PORT: u16 = 53;

/// Default TTL floor in seconds, used when `minTTL` is not configured and
/// substituted for zero-TTL answers
pub const DEFAULT_MIN_TTL_SECS: i32 = 5;

/// Default number of consecutive resolution failures before a resolved name
/// becomes eligible for removal
pub const DEFAULT_FAILURE_THRESHOLD: i32 = 5;

/// Margin within which two next-lookup times compare equal (seconds)
pub const NEXT_LOOKUP_TIME_MARGIN_SECS: i64 = 5;

// ============================================================================
// Scheduler Constants
// ============================================================================

/// Upper bound on the time between synthetic lookups of a tracked name (30 minutes)
pub const DEFAULT_MAX_TTL_SECS: u64 = 30 * 60;

/// Timeout for a single synthetic DNS query (matches the TTL floor)
pub const LOOKUP_TIMEOUT_SECS: u64 = 5;

/// Maximum number of CoreDNS pods a synthetic lookup fans out to
pub const MAX_COREDNS_POD_IPS: usize = 5;

/// Additional time past a TTL expiry before an address is pruned from status (seconds)
pub const IP_REMOVAL_GRACE_PERIOD_SECS: i64 = 5;

// ============================================================================
// Watch Startup Constants
// ============================================================================

/// Maximum time to wait for the initial CR watch sync before serving anyway
pub const SYNC_WAIT_TIMEOUT_MILLIS: u64 = 5000;

/// Interval at which a warning is logged while waiting for the initial sync
pub const SYNC_WAIT_LOG_INTERVAL_MILLIS: u64 = 500;

/// Interval at which the initial sync flag is polled
pub const SYNC_POLL_INTERVAL_MILLIS: u64 = 100;

// ============================================================================
// Conflict Retry Constants
// ============================================================================

/// Initial interval between status-update conflict retries (10ms)
pub const CONFLICT_RETRY_INITIAL_MILLIS: u64 = 10;

/// Backoff multiplier for conflict retries
pub const CONFLICT_RETRY_MULTIPLIER: f64 = 2.0;

/// Randomization factor for conflict retries (±10%)
pub const CONFLICT_RETRY_JITTER: f64 = 0.1;

/// Number of status-update attempts before a conflict is surfaced
pub const CONFLICT_RETRY_STEPS: u32 = 5;

// ============================================================================
// Controller Error Handling Constants
// ============================================================================

/// Requeue duration for controller errors (30 seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

// ============================================================================
// Leader Election Constants
// ============================================================================

/// Default leader election lease duration (15 seconds)
pub const DEFAULT_LEASE_DURATION_SECS: u64 = 15;

/// Default leader election retry period (2 seconds)
pub const DEFAULT_LEASE_RETRY_PERIOD_SECS: u64 = 2;

/// Lease name used for leader election
pub const LEASE_NAME: &str = "resolvy-leader";

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for the operator Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

/// Path for the Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Conflict retry for status updates.
//!
//! Every status write is a read-modify-write against the versioned object
//! store. This module provides the bounded exponential backoff and the retry
//! loop shared by the interceptor and the controller:
//!
//! 1. Read via the local cache (lister) first. If the cache hands back the
//!    same resourceVersion that just conflicted, it is stale; read live
//!    from the apiserver instead.
//! 2. Compose the new status on a copy of the object.
//! 3. Skip the RPC entirely when the mutation reports no change.
//! 4. On a conflict, back off and retry; any other error is surfaced.

use crate::constants::{
    CONFLICT_RETRY_INITIAL_MILLIS, CONFLICT_RETRY_JITTER, CONFLICT_RETRY_MULTIPLIER,
    CONFLICT_RETRY_STEPS,
};
use crate::crd::DNSNameResolver;
use crate::store::{ResolverStore, StoreError};
use rand::Rng;
use std::time::Duration;
use tracing::info;

/// Simple exponential backoff with randomization (jitter) and a bounded
/// number of steps.
pub struct ExponentialBackoff {
    /// Current interval duration
    current_interval: Duration,
    /// Backoff multiplier (typically 2.0 for doubling)
    multiplier: f64,
    /// Randomization factor (e.g., 0.1 for ±10%)
    randomization_factor: f64,
    /// Steps left before the backoff is exhausted
    remaining_steps: u32,
}

impl ExponentialBackoff {
    fn new(
        initial_interval: Duration,
        multiplier: f64,
        randomization_factor: f64,
        steps: u32,
    ) -> Self {
        Self {
            current_interval: initial_interval,
            multiplier,
            randomization_factor,
            remaining_steps: steps,
        }
    }

    /// Get the next backoff interval, or `None` once the step budget is spent.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.remaining_steps == 0 {
            return None;
        }
        self.remaining_steps -= 1;

        let jittered = self.apply_jitter(self.current_interval);
        let next = self.current_interval.as_secs_f64() * self.multiplier;
        self.current_interval = Duration::from_secs_f64(next);

        Some(jittered)
    }

    fn apply_jitter(&self, interval: Duration) -> Duration {
        if self.randomization_factor == 0.0 {
            return interval;
        }

        let secs = interval.as_secs_f64();
        let delta = secs * self.randomization_factor;
        let mut rng = rand::thread_rng();
        let jittered = rng.gen_range((secs - delta)..=(secs + delta));

        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Backoff used between status-update conflict retries.
///
/// 10ms initial interval, doubling, ±10% jitter, five steps. With these
/// settings the retries land at roughly 10ms, 20ms, 40ms, 80ms and 160ms
/// before the conflict is surfaced to the caller.
#[must_use]
pub fn conflict_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(
        Duration::from_millis(CONFLICT_RETRY_INITIAL_MILLIS),
        CONFLICT_RETRY_MULTIPLIER,
        CONFLICT_RETRY_JITTER,
        CONFLICT_RETRY_STEPS,
    )
}

/// Run a status mutation under the optimistic-concurrency retry policy.
///
/// `mutate` receives a copy of the freshest known object and returns whether
/// it changed the status; when it reports `false` no API call is made. On a
/// write conflict the object is re-read (bypassing a stale cache) and the
/// mutation is recomputed from scratch, so each attempt carries a whole new
/// status.
///
/// # Errors
///
/// Returns the store error when a read fails, when a non-conflict update
/// error occurs, or when the conflict retry budget is exhausted.
pub async fn update_status_with_conflict_retry<F>(
    store: &dyn ResolverStore,
    namespace: &str,
    name: &str,
    mut mutate: F,
) -> Result<(), StoreError>
where
    F: FnMut(&mut DNSNameResolver) -> bool + Send,
{
    let mut backoff = conflict_backoff();
    let mut previous_resource_version = String::from("0");

    loop {
        let mut obj = match store.cached(namespace, name) {
            Ok(obj) => obj,
            Err(StoreError::NotCached { .. }) => store.live(namespace, name).await?,
            Err(error) => return Err(error),
        };

        let resource_version = obj.metadata.resource_version.clone().unwrap_or_default();
        if resource_version == previous_resource_version {
            // The previous attempt conflicted at this version and the lister
            // has not caught up yet; fetch the object live instead.
            obj = store.live(namespace, name).await?;
            let live_version = obj.metadata.resource_version.clone().unwrap_or_default();
            info!(
                namespace,
                name,
                lister_resource_version = %resource_version,
                live_resource_version = %live_version,
                "lister was stale, fetched live object"
            );
            previous_resource_version = live_version;
        } else {
            previous_resource_version = resource_version;
        }

        let mut new_obj = obj.clone();
        if !mutate(&mut new_obj) {
            return Ok(());
        }

        match store.update_status(namespace, &new_obj).await {
            Ok(_) => return Ok(()),
            Err(error) if error.is_conflict() => match backoff.next_backoff() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return Err(error),
            },
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;

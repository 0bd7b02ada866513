// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use axum::{routing::get, Router};
use clap::Parser;
use kube::Client;
use kube_lease_manager::LeaseManagerBuilder;
use resolvy::{
    constants::{
        DEFAULT_LEASE_DURATION_SECS, DEFAULT_LEASE_RETRY_PERIOD_SECS, LEASE_NAME,
        METRICS_SERVER_PATH, TOKIO_WORKER_THREADS,
    },
    controller::{
        resolver::{CoreDnsLookup, Resolver},
        run_controller,
        sampler::{KubeEndpointSliceLister, PodIpSampler},
    },
    metrics,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Operator for DNSNameResolver objects: schedules DNS re-resolution before
/// TTLs expire and prunes stale resolved addresses.
#[derive(Parser, Debug)]
#[command(name = "resolvy")]
#[command(version, about, long_about = None)]
struct Args {
    /// The address the metric endpoint binds to.
    #[arg(long, default_value = "0.0.0.0:8080")]
    metrics_bind_address: String,

    /// The address the probe endpoint binds to.
    #[arg(long, default_value = "0.0.0.0:8081")]
    health_probe_bind_address: String,

    /// Enable leader election for the controller manager. Enabling this
    /// ensures there is only one active controller manager.
    #[arg(long)]
    leader_elect: bool,

    /// If set, HTTP/2 will be enabled for the metrics and probe servers.
    /// Disabled by default to avoid the HTTP/2 stream-cancellation and
    /// rapid-reset vulnerabilities.
    #[arg(long)]
    enable_http2: bool,

    /// The namespace of the CoreDNS resources.
    #[arg(long, default_value = "kube-system")]
    coredns_namespace: String,

    /// The name of the CoreDNS service.
    #[arg(long, default_value = "kube-dns")]
    coredns_service_name: String,

    /// The namespace to watch for the DNSNameResolver objects.
    #[arg(long, default_value = "dns-system")]
    dns_name_resolver_namespace: String,
}

fn main() -> Result<()> {
    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("resolvy-operator")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

/// Initialize logging with custom format
///
/// Respects `RUST_LOG` environment variable if set, otherwise defaults to INFO level.
/// Respects `RUST_LOG_FORMAT` environment variable for output format (json or text).
fn initialize_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!("Starting DNSNameResolver operator");
}

/// Start the Prometheus metrics HTTP server.
fn start_metrics_server(bind_address: &str) -> tokio::task::JoinHandle<()> {
    let bind_address = bind_address.to_string();
    info!(bind_address = %bind_address, path = METRICS_SERVER_PATH, "starting metrics server");

    tokio::spawn(async move {
        async fn metrics_handler() -> String {
            match metrics::gather_metrics() {
                Ok(metrics_text) => metrics_text,
                Err(error) => {
                    error!(error = %error, "failed to gather metrics");
                    String::from("# Error gathering metrics\n")
                }
            }
        }

        let app = Router::new().route(METRICS_SERVER_PATH, get(metrics_handler));
        let listener = match tokio::net::TcpListener::bind(&bind_address).await {
            Ok(listener) => listener,
            Err(error) => {
                error!(bind_address = %bind_address, error = %error, "failed to bind metrics server");
                return;
            }
        };

        if let Err(error) = axum::serve(listener, app).await {
            error!(error = %error, "metrics server error");
        }
    })
}

/// Start the health and readiness probe HTTP server.
fn start_probe_server(bind_address: &str) -> tokio::task::JoinHandle<()> {
    let bind_address = bind_address.to_string();
    info!(bind_address = %bind_address, "starting probe server");

    tokio::spawn(async move {
        let app = Router::new()
            .route("/healthz", get(|| async { "ok" }))
            .route("/readyz", get(|| async { "ok" }));
        let listener = match tokio::net::TcpListener::bind(&bind_address).await {
            Ok(listener) => listener,
            Err(error) => {
                error!(bind_address = %bind_address, error = %error, "failed to bind probe server");
                return;
            }
        };

        if let Err(error) = axum::serve(listener, app).await {
            error!(error = %error, "probe server error");
        }
    })
}

async fn async_main() -> Result<()> {
    let args = Args::parse();
    initialize_logging();

    if !args.enable_http2 {
        // Mitigates the HTTP/2 stream-cancellation and rapid-reset CVEs;
        // plaintext axum negotiates HTTP/1.1 only.
        info!("disabling http/2");
    }

    debug!("initializing Kubernetes client");
    let client = Client::try_default().await?;

    let _metrics_handle = start_metrics_server(&args.metrics_bind_address);
    let _probe_handle = start_probe_server(&args.health_probe_bind_address);

    let lister = Arc::new(KubeEndpointSliceLister::new(
        client.clone(),
        &args.coredns_namespace,
        &args.coredns_service_name,
    ));
    let sampler = PodIpSampler::new(lister);
    let lookup = Arc::new(CoreDnsLookup::new(sampler));
    let resolver = Arc::new(Resolver::new(lookup));
    resolver.start();

    if args.leader_elect {
        let identity = std::env::var("POD_NAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| format!("resolvy-{}", rand::random::<u32>()));

        info!(
            lease_name = LEASE_NAME,
            lease_namespace = %args.dns_name_resolver_namespace,
            identity = %identity,
            "leader election enabled, waiting to acquire leadership"
        );

        let lease_manager =
            LeaseManagerBuilder::new(client.clone(), LEASE_NAME)
                .with_namespace(&args.dns_name_resolver_namespace)
                .with_identity(&identity)
                .with_duration(DEFAULT_LEASE_DURATION_SECS)
                .with_grace(DEFAULT_LEASE_RETRY_PERIOD_SECS)
                .build()
                .await?;

        let (leader_rx, _lease_handle) = lease_manager.watch().await;

        let mut rx = leader_rx.clone();
        while !*rx.borrow_and_update() {
            rx.changed().await?;
        }
        info!("leadership acquired, starting controller");

        run_with_leader_election(client, resolver, &args.dns_name_resolver_namespace, leader_rx)
            .await?;
    } else {
        warn!("leader election disabled, running without high availability");
        run_until_signal(client, resolver, &args.dns_name_resolver_namespace).await?;
    }

    info!("graceful shutdown completed");
    Ok(())
}

/// Wait for SIGTERM; on non-Unix platforms, wait forever.
async fn sigterm() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        sigterm.recv().await;
        Ok(())
    }
    #[cfg(not(unix))]
    {
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Run the controller until a shutdown signal arrives.
async fn run_until_signal(
    client: Client,
    resolver: Arc<Resolver>,
    namespace: &str,
) -> Result<()> {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            info!("received SIGINT, initiating graceful shutdown");
            result.map_err(anyhow::Error::from)
        }
        result = sigterm() => {
            info!("received SIGTERM, initiating graceful shutdown");
            result
        }
        result = run_controller(client, resolver, namespace) => {
            error!("DNSNameResolver controller exited unexpectedly: {result:?}");
            result?;
            anyhow::bail!("DNSNameResolver controller exited unexpectedly without error")
        }
    }
}

/// Monitor leadership status - returns when leadership is lost or an error occurs
async fn monitor_leadership(mut leader_rx: tokio::sync::watch::Receiver<bool>) -> Result<()> {
    loop {
        leader_rx.changed().await?;
        if !*leader_rx.borrow() {
            return Ok(());
        }
    }
}

/// Run the controller while holding the leader lease; step down on loss.
async fn run_with_leader_election(
    client: Client,
    resolver: Arc<Resolver>,
    namespace: &str,
    leader_rx: tokio::sync::watch::Receiver<bool>,
) -> Result<()> {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            info!("received SIGINT, releasing lease and shutting down");
            result.map_err(anyhow::Error::from)
        }
        result = sigterm() => {
            info!("received SIGTERM, releasing lease and shutting down");
            result
        }
        result = monitor_leadership(leader_rx) => {
            match result {
                Ok(()) => {
                    warn!("leadership lost, stepping down");
                    anyhow::bail!("leadership lost - stepping down")
                }
                Err(error) => {
                    error!(error = %error, "leadership monitor error");
                    anyhow::bail!("leadership monitoring failed: {error}")
                }
            }
        }
        result = run_controller(client, resolver, namespace) => {
            error!("DNSNameResolver controller exited unexpectedly: {result:?}");
            result?;
            anyhow::bail!("DNSNameResolver controller exited unexpectedly without error")
        }
    }
}

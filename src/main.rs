//! Application Master process entry point: wires configuration,
//! telemetry, the event bus/dispatcher, the RM/NM collaborator
//! communicators, the worker RPC server, and the operator-facing admin
//! HTTP surface together, then runs until `ctrl_c`.

use am_common::config::Config;
use am_common::{metrics, telemetry};
use am_engine::Registry;
use am_rpc::{run_nm_communicator, run_rm_communicator, serve, StubNodeManagerClient, StubResourceManagerClient, TaskAttemptListener};
use anyhow::Result;
use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| anyhow::anyhow!("failed to load config: {e}"))?;

    if let Err(errors) = config.validate() {
        for error in errors {
            eprintln!("config error: {error}");
        }
        std::process::exit(1);
    }

    telemetry::init_telemetry(&config.observability)?;
    metrics::init_metrics()?;

    info!("starting application master v{}", env!("CARGO_PKG_VERSION"));

    let registry = Arc::new(Registry::new());
    let (bus, dispatcher, channels) = am_engine::new_bus(registry.clone(), config.am.clone());
    let dispatcher_handle = tokio::spawn(dispatcher.run());

    let rm_client = Arc::new(StubResourceManagerClient::new());
    let nm_client = Arc::new(StubNodeManagerClient);
    tokio::spawn(run_rm_communicator(channels.rm_rx, bus.clone(), rm_client));
    tokio::spawn(run_nm_communicator(channels.nm_rx, bus.clone(), nm_client));

    let listener = Arc::new(TaskAttemptListener::new(registry.clone(), bus.clone()));
    let rpc_addr: SocketAddr = "0.0.0.0:9999".parse()?;
    let rpc_listener = listener.clone();
    let task_listener_threads = config.am.task_listener_threads;
    tokio::spawn(async move {
        if let Err(err) = serve(rpc_listener, rpc_addr, task_listener_threads).await {
            tracing::error!(error = %err, "worker rpc server exited");
        }
    });

    let watchdog_listener = listener.clone();
    let heartbeat_timeout = Duration::from_millis(config.heartbeat.timeout_ms);
    let watchdog_interval = Duration::from_millis(config.heartbeat.interval_ms);
    tokio::spawn(watchdog_listener.run_watchdog(heartbeat_timeout, watchdog_interval));

    if config.observability.metrics_enabled {
        let admin_addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        tokio::spawn(serve_admin(admin_addr));
    }

    info!(rpc_addr = %rpc_addr, "application master ready");

    tokio::signal::ctrl_c().await?;
    info!("shutting down application master");
    dispatcher_handle.abort();

    Ok(())
}

/// Minimal operator-facing status surface: liveness and a Prometheus
/// text-format scrape endpoint. Nothing here participates in scheduling.
async fn serve_admin(addr: SocketAddr) {
    let app = Router::new().route("/healthz", get(healthz)).route("/metrics", get(metrics_handler));

    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            info!(%addr, "admin http surface listening");
            if let Err(err) = axum::serve(listener, app).await {
                tracing::error!(error = %err, "admin http surface exited");
            }
        }
        Err(err) => tracing::error!(%addr, error = %err, "failed to bind admin http surface"),
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics_handler() -> String {
    use prometheus::{Encoder, TextEncoder};
    let encoder = TextEncoder::new();
    let families = metrics::METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&families, &mut buffer) {
        tracing::error!(error = %err, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

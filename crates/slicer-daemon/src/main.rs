//! slicer daemon
//!
//! Runs the slice allocation controller against in-memory repositories and
//! serves the REST API used to publish inventory and submit workloads.

use anyhow::{Context, Result};
use clap::Parser;
use slicer_api::{create_router, rest::AppState};
use slicer_controller::{watch_inventory, watch_workloads, Controller, Reconciler};
use slicer_core::{DaemonConfig, LogFormat};
use slicer_health::{DevicePluginHealth, FixedHealth, NodeHealthOracle};
use slicer_store::{MemoryInventory, MemoryWorkloads};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// slicerd - fractional accelerator slice allocator
#[derive(Parser, Debug)]
#[command(name = "slicerd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "SLICER_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind the API server
    #[arg(long)]
    address: Option<String>,

    /// Port for the REST API server
    #[arg(long)]
    port: Option<u16>,

    /// Log level, overridden by RUST_LOG
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Treat the device plugin as always healthy
    #[arg(long)]
    assume_healthy: bool,
}

impl Args {
    fn load_config(&self) -> Result<DaemonConfig> {
        let mut config = match &self.config {
            Some(path) => DaemonConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => DaemonConfig::default(),
        };

        if let Some(address) = &self.address {
            config.api.address = address.clone();
        }
        if let Some(port) = self.port {
            config.api.port = port;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.json_logs {
            config.logging.format = LogFormat::Json;
        }
        Ok(config)
    }
}

fn init_tracing(config: &DaemonConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);

    match config.logging.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.load_config()?;
    init_tracing(&config);

    info!("Starting slicer daemon v{}", env!("CARGO_PKG_VERSION"));
    info!(
        gate = %config.controller.gate_name,
        policy = %config.controller.placement_policy,
        "Configuration loaded"
    );

    let inventory = Arc::new(MemoryInventory::new());
    let workloads = Arc::new(MemoryWorkloads::new());

    let health: Arc<dyn NodeHealthOracle> = if args.assume_healthy {
        warn!("Device plugin health checks disabled");
        Arc::new(FixedHealth::healthy())
    } else {
        Arc::new(DevicePluginHealth::new(
            workloads.clone(),
            &config.controller.health,
        ))
    };

    let reconciler = Reconciler::new(
        inventory.clone(),
        workloads.clone(),
        health,
        config.controller.clone(),
    );
    let controller = Controller::new(Arc::new(reconciler));
    let queue = controller.queue();

    let workload_watch = watch_workloads(workloads.subscribe(), workloads.clone(), queue.clone());
    let inventory_watch = watch_inventory(inventory.subscribe(), inventory.clone(), queue);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let controller_handle = tokio::spawn(controller.run(shutdown_rx.clone()));

    let router = create_router(AppState::new(
        inventory,
        workloads,
        &config.controller.gate_name,
    ));

    let addr: SocketAddr = format!("{}:{}", config.api.address, config.api.port)
        .parse()
        .context("invalid API address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(addr = %addr, "API server listening");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    let _ = shutdown_tx.send(true);
    workload_watch.abort();
    inventory_watch.abort();

    if tokio::time::timeout(Duration::from_secs(10), controller_handle)
        .await
        .is_err()
    {
        warn!("Controller did not shut down in time");
    }

    info!("slicer daemon stopped");
    Ok(())
}

//! Transit VPN Hub Controller Daemon
//!
//! Runs hub reconciliation passes on a fixed interval against the fixture
//! inventory snapshot and the directory-backed artifact store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tv_core::config::{self, HubConfig};
use tv_core::store::DirectoryStore;
use tv_hub::{FixtureInventory, HubReconciler, PassOutcome};

#[derive(Parser)]
#[command(name = "tv-hub")]
#[command(about = "Transit VPN hub controller")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single reconciliation pass and exit
    #[arg(long)]
    once: bool,

    /// Run in foreground with verbose output
    #[arg(short, long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Transit VPN hub controller starting...");

    // Load configuration
    let config: HubConfig = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_hub_config_path();
        if default_path.exists() {
            config::load_config(&default_path)
                .with_context(|| format!("Failed to load config from {:?}", default_path))?
        } else {
            tracing::info!("Using default configuration");
            HubConfig::default()
        }
    };
    config.validate().context("Invalid hub configuration")?;

    let inventory = Arc::new(
        FixtureInventory::load(&config.inventory_snapshot)
            .await
            .with_context(|| {
                format!("Failed to load inventory snapshot {:?}", config.inventory_snapshot)
            })?,
    );
    let store = Arc::new(DirectoryStore::new(config.store.root.clone()));
    tracing::info!(
        "Writing artifacts under {:?} with prefix {}",
        config.store.root,
        config.store.prefix
    );

    let snapshot_path = config.inventory_snapshot.clone();
    let poll_interval = config.poll_interval;
    let reconciler = HubReconciler::new(config, inventory.clone(), store);

    if args.once {
        run_pass(&reconciler).await;
        persist(&inventory, &snapshot_path).await;
        return Ok(());
    }

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Setup signal handlers
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel_clone.cancel();
    });

    let mut interval = tokio::time::interval(poll_interval);
    tracing::info!("Reconciling every {:?}", poll_interval);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_pass(&reconciler).await;
                persist(&inventory, &snapshot_path).await;
            }
            _ = cancel.cancelled() => {
                tracing::info!("Hub controller shutting down");
                break;
            }
        }
    }

    tracing::info!("Hub controller shutdown complete");
    Ok(())
}

/// Run one pass and log its outcome; failures wait for the next pass
async fn run_pass(reconciler: &HubReconciler) {
    match reconciler.run_pass().await {
        Ok(PassOutcome::Idle) => tracing::debug!("Pass complete, nothing to do"),
        Ok(PassOutcome::Provisioned {
            region,
            gateway_id,
            connections,
        }) => tracing::info!(
            "Provisioned {} in {}: {}",
            gateway_id,
            region,
            connections.join(", ")
        ),
        Ok(PassOutcome::Restored {
            region,
            gateway_id,
            connections,
        }) => tracing::info!(
            "Restored artifacts of {} in {}: {}",
            gateway_id,
            region,
            connections.join(", ")
        ),
        Ok(PassOutcome::Decommissioned {
            region,
            gateway_id,
            connections,
        }) => tracing::info!(
            "Decommissioned {} in {}: {}",
            gateway_id,
            region,
            connections.join(", ")
        ),
        Err(e) => tracing::error!("Reconciliation pass failed: {}", e),
    }
}

async fn persist(inventory: &FixtureInventory, path: &std::path::Path) {
    if let Err(e) = inventory.save(path).await {
        tracing::error!("Failed to save inventory snapshot {:?}: {}", path, e);
    }
}

//! Transit VPN Tunnel Agent Daemon
//!
//! Runs router reconciliation passes on a fixed interval, consuming the
//! artifacts for one endpoint label from the directory-backed store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tv_agent::{RestconfClient, RouterReconciler};
use tv_core::config::{self, AgentConfig};
use tv_core::store::DirectoryStore;

#[derive(Parser)]
#[command(name = "tv-agent")]
#[command(about = "Transit VPN tunnel agent")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Endpoint label to consume artifacts for (overrides config)
    #[arg(short, long)]
    endpoint: Option<String>,

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
    let log_level = if args.foreground {
        "debug"
    } else {
        &args.log_level
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Transit VPN tunnel agent starting...");

    // Load configuration
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(config::default_agent_config_path);

    let mut config: AgentConfig = if config_path.exists() {
        config::load_config(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        tracing::info!("Using default configuration");
        AgentConfig::default()
    };

    // Apply command-line overrides
    if let Some(endpoint) = args.endpoint {
        config.endpoint_label = endpoint;
    }
    config.validate().context("Invalid agent configuration")?;

    let router = Arc::new(
        RestconfClient::new(&config.router).context("Failed to set up router API client")?,
    );
    let store = Arc::new(DirectoryStore::new(config.store.root.clone()));
    tracing::info!(
        "Agent for {} using router API at {}",
        config.endpoint_label,
        config.router.base_url
    );

    let poll_interval = config.poll_interval;
    let reconciler = RouterReconciler::new(config, router, store);

    if args.once {
        run_pass(&reconciler).await;
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
            }
            _ = cancel.cancelled() => {
                tracing::info!("Tunnel agent shutting down");
                break;
            }
        }
    }

    tracing::info!("Tunnel agent shutdown complete");
    Ok(())
}

/// Run one pass and log its outcome; failures wait for the next pass
async fn run_pass(reconciler: &RouterReconciler) {
    match reconciler.run_pass().await {
        Ok(report) => {
            if report.total() > 0 {
                tracing::info!(
                    "Pass complete: {} applied, {} malformed, {} failed",
                    report.applied.len(),
                    report.malformed.len(),
                    report.failed.len()
                );
            }
        }
        Err(e) => tracing::error!("Reconciliation pass failed: {}", e),
    }
}

//! Veil Tunnel Client
//!
//! Command-line front end for the tunnel core:
//! - Loads profiles from a TOML config file
//! - Runs the connection manager with real collaborators
//! - Prints status transitions and live traffic snapshots

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use veil_tunnel::{
    config::{generate_example_config, Config},
    net::{LoopbackInterface, TcpProbe},
    stats::ConnectionMonitor,
    store::{MemoryStore, TunnelStore},
    tunnel::ConnectionStatus,
    TunnelManager,
};

/// Veil Tunnel Client - password-authenticated secure tunnel
#[derive(Parser, Debug)]
#[command(name = "veil-client")]
#[command(about = "Veil Tunnel Client - password-authenticated secure tunnel")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Profile name to connect with
    #[arg(short, long)]
    profile: Option<String>,

    /// Write an example configuration file and exit
    #[arg(long)]
    init_config: bool,

    /// Disable automatic reconnection
    #[arg(long)]
    no_reconnect: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    if args.init_config {
        generate_example_config()
            .save(&args.config)
            .context("Failed to write example configuration")?;
        info!("Wrote example configuration to {}", args.config);
        return Ok(());
    }

    // Load configuration
    let config = Config::load(&args.config).context("Failed to load configuration")?;

    let profile = match &args.profile {
        Some(name) => config
            .find_profile(name)
            .ok_or_else(|| anyhow!("No profile named '{}' in {}", name, args.config))?,
        None => config
            .profiles
            .first()
            .ok_or_else(|| anyhow!("No profiles in {}", args.config))?,
    }
    .clone();

    info!(
        "Using profile '{}' ({}, {})",
        profile.name,
        profile.endpoint(),
        profile.method
    );

    let store = Arc::new(MemoryStore::new());
    for p in &config.profiles {
        store
            .put_profile(p.clone())
            .await
            .map_err(|e| anyhow!("Failed to seed profile store: {}", e))?;
    }

    let manager = TunnelManager::new(
        Arc::new(TcpProbe::new()),
        Arc::new(LoopbackInterface::new()),
        store,
        config.tunnel.clone(),
    );
    manager.set_auto_reconnect(!args.no_reconnect);

    tokio::spawn(print_status(manager.status()));
    tokio::spawn(print_monitor(manager.monitor()));

    if let Err(e) = manager.connect(profile).await {
        error!("Initial connection failed: {}", e);
    }

    // Run until interrupted
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");
    manager.disconnect().await;

    Ok(())
}

async fn print_status(mut status_rx: watch::Receiver<ConnectionStatus>) {
    loop {
        let status = status_rx.borrow_and_update().clone();
        match (&status.profile_name, &status.message) {
            (Some(name), Some(message)) => {
                info!("[{:?}] {} ({})", status.state, name, message)
            }
            (Some(name), None) => info!("[{:?}] {}", status.state, name),
            _ => info!("[{:?}]", status.state),
        }
        if status_rx.changed().await.is_err() {
            return;
        }
    }
}

async fn print_monitor(mut monitor_rx: watch::Receiver<ConnectionMonitor>) {
    loop {
        if monitor_rx.changed().await.is_err() {
            return;
        }
        let monitor = *monitor_rx.borrow_and_update();
        info!("{}", monitor.summary());
    }
}

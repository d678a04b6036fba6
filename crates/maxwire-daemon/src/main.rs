//! Maxwire Daemon - Main entry point
//!
//! The daemon holds the receiver key pair and serves running-max streams.

use std::sync::Arc;

use tracing::{error, info};

use maxwire_daemon::{DaemonConfig, StreamServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    maxwire_daemon::init_logging("maxwire_daemon=info,maxwire_core=info");

    info!("Starting maxwire daemon v{}", env!("CARGO_PKG_VERSION"));

    // Load or create config
    let config_path = DaemonConfig::default_path();
    let config = if config_path.exists() {
        DaemonConfig::load(&config_path)?
    } else {
        let config = DaemonConfig::default();
        config.save(&config_path)?;
        info!("Created default config at {:?}", config_path);
        config
    };

    // Ensure directories exist
    config.ensure_directories()?;

    // A key store fault here is fatal
    let store = config.key_store();
    let receiver_key_name = config.receiver_key_name.clone();
    let receiver =
        tokio::task::spawn_blocking(move || store.load_or_create(&receiver_key_name)).await??;
    info!(
        "Receiver key '{}' ready ({})",
        config.receiver_key_name,
        receiver.fingerprint()?
    );

    let server = StreamServer::new(
        config.address(),
        Arc::new(receiver),
        config.value_policy,
        config.stream_idle_timeout(),
    );

    let server_handle = tokio::spawn(async move { server.run().await });

    info!("Daemon started successfully");

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            if let Err(e) = result? {
                error!("Stream server error: {}", e);
                return Err(e.into());
            }
            error!("Stream server exited unexpectedly");
        }
    }

    info!("Daemon shutting down");

    Ok(())
}

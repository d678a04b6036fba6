//! Maxwire Daemon - Stream server, sender driver and configuration
//!
//! This crate provides:
//! - Length-delimited protobuf framing over any async byte stream
//! - TCP transport behind a swappable transport trait
//! - The receiver's stream server, one aggregator per connection
//! - The sender's stream driver and client
//! - Shared JSON configuration

pub mod config;
pub mod error;
pub mod stream;

pub use config::DaemonConfig;
pub use error::{DaemonError, Result};
pub use stream::{StreamClient, StreamDriver, StreamReport, StreamServer};

/// Install the `tracing` subscriber used by the binaries, honouring `RUST_LOG`
pub fn init_logging(default_filter: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

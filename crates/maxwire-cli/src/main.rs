//! Maxwire CLI - Sender side of a running-max stream
//!
//! Streams sealed integers to the receiver daemon and prints every new
//! maximum it reports. Also manages key pairs in the shared key store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use maxwire_core::RotatingIdentity;
use maxwire_daemon::{DaemonConfig, StreamClient, StreamDriver};
use tracing::debug;

#[derive(Parser)]
#[command(name = "maxwire")]
#[command(about = "Stream signed, encrypted integers and watch the running maximum", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to $MAXWIRE_CONFIG or the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Key store directory, overrides the config file
    #[arg(long, global = true)]
    keystore: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send values to the receiver
    Send {
        /// Values to stream, in order
        #[arg(allow_negative_numbers = true, default_values_t = vec![1, 5, 3, 6, 2, 20])]
        values: Vec<i32>,

        /// Receiver host, overrides the config file
        #[arg(long)]
        host: Option<String>,

        /// Receiver port, overrides the config file
        #[arg(long)]
        port: Option<String>,
    },

    /// Create a key pair if it does not exist yet
    Keygen {
        /// Key name
        name: String,
    },

    /// Print the PEM public key of a key pair
    Pubkey {
        /// Key name
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    maxwire_daemon::init_logging("maxwire=info,maxwire_daemon=info");

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Send { values, host, port } => send(config, values, host, port).await,
        Commands::Keygen { name } => keygen(config, name).await,
        Commands::Pubkey { name } => pubkey(config, &name),
    }
}

fn load_config(cli: &Cli) -> Result<DaemonConfig> {
    let path = cli.config.clone().unwrap_or_else(DaemonConfig::default_path);
    let mut config = DaemonConfig::load_or_default(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    debug!("Using config {:?}", path);

    if let Some(keystore) = &cli.keystore {
        config.keystore_path = keystore.clone();
    }
    Ok(config)
}

async fn send(
    mut config: DaemonConfig,
    values: Vec<i32>,
    host: Option<String>,
    port: Option<String>,
) -> Result<()> {
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    config.validate()?;

    let store = config.key_store();
    let receiver_public_key = store
        .load_public_key(&config.receiver_key_name)
        .with_context(|| {
            format!(
                "Receiver key '{}' is not in {}; start the daemon or copy its .pub file there",
                config.receiver_key_name,
                store.root().display()
            )
        })?;

    let identity = RotatingIdentity::new(
        store,
        config.identity_prefix.clone(),
        config.identity_rotation()?,
    );
    let driver = StreamDriver::new(Arc::new(identity), receiver_public_key)
        .with_policy(config.value_policy)
        .with_idle_timeout(config.stream_idle_timeout());

    let client = StreamClient::new(config.address(), driver);
    let report = client.send(values).await?;

    println!("Sent {} values", report.sent);
    for max in &report.updates {
        println!("  new max: {}", max);
    }
    match report.updates.last() {
        Some(max) => println!("Final max: {}", max),
        None => println!("No maximum reported"),
    }
    Ok(())
}

async fn keygen(config: DaemonConfig, name: String) -> Result<()> {
    let store = config.key_store();
    let existed = store.contains(&name);

    let pair = {
        let store = store.clone();
        let name = name.clone();
        tokio::task::spawn_blocking(move || store.load_or_create(&name)).await??
    };

    println!("Key pair '{}'", name);
    println!("  Status: {}", if existed { "existing" } else { "created" });
    println!("  Bits: {}", pair.bits());
    println!("  Fingerprint: {}", pair.fingerprint()?);
    println!("  Private key: {}", store.private_key_path(&name)?.display());
    println!("  Public key: {}", store.public_key_path(&name)?.display());
    Ok(())
}

fn pubkey(config: DaemonConfig, name: &str) -> Result<()> {
    let store = config.key_store();
    let public_key = store.load_public_key(name)?;
    print!("{}", maxwire_core::crypto::encode_public_key_pem(&public_key)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_defaults() {
        let cli = Cli::try_parse_from(["maxwire", "send"]).unwrap();
        match cli.command {
            Commands::Send { values, host, port } => {
                assert_eq!(values, vec![1, 5, 3, 6, 2, 20]);
                assert!(host.is_none());
                assert!(port.is_none());
            }
            _ => panic!("expected send"),
        }
    }

    #[test]
    fn test_send_negative_values_and_overrides() {
        let cli = Cli::try_parse_from([
            "maxwire", "send", "4", "-2", "9", "--port", "6000", "--keystore", "/tmp/keys",
        ])
        .unwrap();

        assert_eq!(cli.keystore, Some(PathBuf::from("/tmp/keys")));
        match cli.command {
            Commands::Send { values, port, .. } => {
                assert_eq!(values, vec![4, -2, 9]);
                assert_eq!(port.as_deref(), Some("6000"));
            }
            _ => panic!("expected send"),
        }
    }

    #[test]
    fn test_keystore_override() {
        let cli = Cli::try_parse_from([
            "maxwire",
            "--config",
            "/nonexistent/maxwire.json",
            "--keystore",
            "/tmp/keys",
            "pubkey",
            "receiver",
        ])
        .unwrap();

        let config = load_config(&cli).unwrap();
        assert_eq!(config.keystore_path, PathBuf::from("/tmp/keys"));
        assert_eq!(config.address(), "localhost:50052");
    }

    #[test]
    fn test_rejects_non_integer_values() {
        assert!(Cli::try_parse_from(["maxwire", "send", "1", "two"]).is_err());
    }
}

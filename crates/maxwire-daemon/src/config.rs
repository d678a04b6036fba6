//! Daemon configuration

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use maxwire_core::{KeyStore, ValuePolicy, DEFAULT_KEY_BITS};
use serde::{Deserialize, Serialize};

use crate::error::{DaemonError, Result};

/// Environment variable that overrides the config file location
pub const CONFIG_ENV_VAR: &str = "MAXWIRE_CONFIG";

/// Shared configuration for the receiver daemon and the sender CLI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Host the receiver listens on and the sender dials
    pub host: String,

    /// Port, kept as a string so it joins verbatim into the address
    pub port: String,

    /// Root directory of the key store
    pub keystore_path: PathBuf,

    /// Modulus size for newly generated key pairs
    pub key_bits: usize,

    /// Key store name of the receiver's key pair
    pub receiver_key_name: String,

    /// Prefix for rotating sender identities
    pub identity_prefix: String,

    /// Messages signed by each sender identity before rotating
    pub rotate_identity_every: usize,

    /// Values admitted on both ends of the stream
    pub value_policy: ValuePolicy,

    /// Longest wait for a single frame (seconds)
    pub stream_idle_timeout_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: "50052".to_string(),
            keystore_path: Self::default_keystore_path(),
            key_bits: DEFAULT_KEY_BITS,
            receiver_key_name: "receiver".to_string(),
            identity_prefix: "sender".to_string(),
            rotate_identity_every: 1,
            value_policy: ValuePolicy::default(),
            stream_idle_timeout_secs: 30,
        }
    }
}

impl DaemonConfig {
    fn default_keystore_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| {
                #[cfg(unix)]
                {
                    PathBuf::from("/var/lib")
                }
                #[cfg(windows)]
                {
                    PathBuf::from(r"C:\ProgramData")
                }
            })
            .join("maxwire")
            .join("keystore")
    }

    /// Config file location: `$MAXWIRE_CONFIG`, else the platform config dir
    pub fn default_path() -> PathBuf {
        std::env::var(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                #[cfg(unix)]
                let fallback = PathBuf::from("/etc");
                #[cfg(windows)]
                let fallback = PathBuf::from(r"C:\ProgramData");

                dirs::config_dir()
                    .unwrap_or(fallback)
                    .join("maxwire")
                    .join("daemon.json")
            })
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }

    pub fn identity_rotation(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.rotate_identity_every).ok_or_else(|| {
            DaemonError::Config("rotate_identity_every must be at least 1".to_string())
        })
    }

    /// Key store rooted at `keystore_path`
    pub fn key_store(&self) -> KeyStore {
        KeyStore::new(&self.keystore_path).with_key_bits(self.key_bits)
    }

    /// Reject values that would only fail later, mid-stream
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(DaemonError::Config("host must not be empty".to_string()));
        }
        if self.port.parse::<u16>().is_err() {
            return Err(DaemonError::Config(format!(
                "port '{}' is not a valid port number",
                self.port
            )));
        }
        if self.stream_idle_timeout_secs == 0 {
            return Err(DaemonError::Config(
                "stream_idle_timeout_secs must be at least 1".to_string(),
            ));
        }
        self.identity_rotation()?;
        Ok(())
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or return the defaults if it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Create directories if they don't exist
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.keystore_path)?;
        Ok(())
    }
}

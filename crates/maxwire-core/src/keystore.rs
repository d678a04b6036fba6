//! Key pair storage
//!
//! Persists RSA key pairs as two PEM files per logical name under an
//! explicit root directory: `<name>.key` (private) and `<name>.pub` (public).

use std::fs;
use std::path::{Path, PathBuf};

use rsa::RsaPublicKey;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::crypto::{parse_public_key_pem, KeyPair, DEFAULT_KEY_BITS};
use crate::error::{Error, Result};

/// File extension of the private key artifact
pub const PRIVATE_KEY_EXTENSION: &str = "key";
/// File extension of the public key artifact
pub const PUBLIC_KEY_EXTENSION: &str = "pub";

/// Storage for named RSA key pairs
#[derive(Debug, Clone)]
pub struct KeyStore {
    /// Base path for storage
    root: PathBuf,

    /// Modulus size for newly generated pairs
    key_bits: usize,
}

impl KeyStore {
    /// Create a key store rooted at `root`. Nothing is touched on disk until
    /// a pair is generated.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            key_bits: DEFAULT_KEY_BITS,
        }
    }

    /// Override the modulus size used for new pairs
    pub fn with_key_bits(mut self, key_bits: usize) -> Self {
        self.key_bits = key_bits;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn key_bits(&self) -> usize {
        self.key_bits
    }

    /// Load the pair stored under `name`, generating and persisting a fresh
    /// one if neither artifact exists.
    pub fn load_or_create(&self, name: &str) -> Result<KeyPair> {
        let private_path = self.private_key_path(name)?;
        let public_path = self.public_key_path(name)?;

        match (private_path.exists(), public_path.exists()) {
            (true, true) => {
                debug!("Reading key pair '{}' from {:?}", name, self.root);
                let private_pem = Zeroizing::new(fs::read_to_string(&private_path)?);
                let public_pem = fs::read_to_string(&public_path)?;
                KeyPair::from_pem(&private_pem, &public_pem)
            }
            (false, false) => {
                info!(
                    "Key pair '{}' not found in {:?}, generating {}-bit pair",
                    name, self.root, self.key_bits
                );
                let pair = KeyPair::generate(self.key_bits)?;
                self.persist(name, &pair)?;
                Ok(pair)
            }
            (true, false) => Err(Error::IncompleteKeyPair {
                name: name.to_string(),
                missing: public_path,
            }),
            (false, true) => Err(Error::IncompleteKeyPair {
                name: name.to_string(),
                missing: private_path,
            }),
        }
    }

    /// Load only the public half of `name`. Never generates.
    pub fn load_public_key(&self, name: &str) -> Result<RsaPublicKey> {
        let path = self.public_key_path(name)?;
        if !path.exists() {
            return Err(Error::Storage(format!(
                "Public key '{}' not found at {}",
                name,
                path.display()
            )));
        }
        parse_public_key_pem(&fs::read_to_string(&path)?)
    }

    /// Whether both artifacts for `name` exist
    pub fn contains(&self, name: &str) -> bool {
        match (self.private_key_path(name), self.public_key_path(name)) {
            (Ok(private_path), Ok(public_path)) => private_path.exists() && public_path.exists(),
            _ => false,
        }
    }

    /// Path of the private key artifact for `name`
    pub fn private_key_path(&self, name: &str) -> Result<PathBuf> {
        self.artifact_path(name, PRIVATE_KEY_EXTENSION)
    }

    /// Path of the public key artifact for `name`
    pub fn public_key_path(&self, name: &str) -> Result<PathBuf> {
        self.artifact_path(name, PUBLIC_KEY_EXTENSION)
    }

    fn artifact_path(&self, name: &str, extension: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(format!("{}.{}", name, extension)))
    }

    /// Write both artifacts, creating the root directory if needed
    fn persist(&self, name: &str, pair: &KeyPair) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| {
            Error::Storage(format!(
                "Failed to create key directory {}: {}",
                self.root.display(),
                e
            ))
        })?;

        let private_path = self.private_key_path(name)?;
        write_atomic(&private_path, pair.private_key_pem()?.as_bytes())?;

        // Set restrictive permissions (Unix only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&private_path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&private_path, perms)?;
        }

        let public_path = self.public_key_path(name)?;
        write_atomic(&public_path, pair.public_key_pem()?.as_bytes())?;

        info!(
            "Saved key pair '{}' ({}) to {:?}",
            name,
            pair.fingerprint()?,
            self.root
        );
        Ok(())
    }
}

/// Write to a temp file first, then rename
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);
    fs::write(&temp_path, contents)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
    {
        return Err(Error::Storage(format!("Invalid key name '{}'", name)));
    }
    Ok(())
}

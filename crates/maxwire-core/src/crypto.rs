//! RSA key pairs and their PEM encodings

use std::fmt;

use pem::{EncodeConfig, LineEnding, Pem};
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Modulus size used when nothing else is configured
pub const DEFAULT_KEY_BITS: usize = 4096;

/// PKCS#1 private key label
pub const RSA_PRIVATE_KEY_TAG: &str = "RSA PRIVATE KEY";
/// PKCS#8 private key label
pub const PRIVATE_KEY_TAG: &str = "PRIVATE KEY";
/// SPKI public key label
pub const PUBLIC_KEY_TAG: &str = "PUBLIC KEY";
/// PKCS#1 public key label. Some peers put SPKI bytes under it.
pub const RSA_PUBLIC_KEY_TAG: &str = "RSA PUBLIC KEY";

/// An RSA key pair whose halves are known to belong together
#[derive(Clone, PartialEq)]
pub struct KeyPair {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
}

impl KeyPair {
    /// Generate a fresh pair from the OS random source
    pub fn generate(bits: usize) -> Result<Self> {
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| Error::Crypto(format!("Key generation failed: {}", e)))?;
        let public_key = private_key.to_public_key();
        Ok(Self {
            private_key,
            public_key,
        })
    }

    /// Assemble a pair, rejecting halves that do not match
    pub fn from_parts(private_key: RsaPrivateKey, public_key: RsaPublicKey) -> Result<Self> {
        if private_key.to_public_key() != public_key {
            return Err(Error::KeyFormat(
                "Public key does not belong to private key".to_string(),
            ));
        }
        Ok(Self {
            private_key,
            public_key,
        })
    }

    /// Parse both halves from PEM text
    pub fn from_pem(private_pem: &str, public_pem: &str) -> Result<Self> {
        let private_key = parse_private_key_pem(private_pem)?;
        let public_key = parse_public_key_pem(public_pem)?;
        Self::from_parts(private_key, public_key)
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// Modulus size in bits
    pub fn bits(&self) -> usize {
        self.public_key.size() * 8
    }

    /// PKCS#1 PEM of the private half
    pub fn private_key_pem(&self) -> Result<Zeroizing<String>> {
        encode_private_key_pem(&self.private_key)
    }

    /// SPKI PEM of the public half
    pub fn public_key_pem(&self) -> Result<String> {
        encode_public_key_pem(&self.public_key)
    }

    /// Short identifier for logs
    pub fn fingerprint(&self) -> Result<String> {
        fingerprint(&self.public_key)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fingerprint = self
            .fingerprint()
            .unwrap_or_else(|_| "<unencodable>".to_string());
        f.debug_struct("KeyPair")
            .field("bits", &self.bits())
            .field("fingerprint", &fingerprint)
            .finish_non_exhaustive()
    }
}

/// First 8 bytes of SHA-256 over the SPKI DER, hex encoded
pub fn fingerprint(key: &RsaPublicKey) -> Result<String> {
    let der = key.to_public_key_der()?;
    let digest = Sha256::digest(der.as_bytes());
    Ok(hex::encode(&digest[..8]))
}

fn encode_lf(pem: &Pem) -> String {
    pem::encode_config(pem, EncodeConfig::new().set_line_ending(LineEnding::LF))
}

pub fn encode_private_key_pem(key: &RsaPrivateKey) -> Result<Zeroizing<String>> {
    let der = key.to_pkcs1_der()?;
    let pem = Pem::new(RSA_PRIVATE_KEY_TAG, der.as_bytes());
    Ok(Zeroizing::new(encode_lf(&pem)))
}

pub fn encode_public_key_pem(key: &RsaPublicKey) -> Result<String> {
    let der = key.to_public_key_der()?;
    Ok(encode_lf(&Pem::new(PUBLIC_KEY_TAG, der.as_bytes())))
}

/// Parse a PKCS#1 or PKCS#8 private key
pub fn parse_private_key_pem(input: &str) -> Result<RsaPrivateKey> {
    let pem = pem::parse(input)?;
    match pem.tag() {
        RSA_PRIVATE_KEY_TAG => Ok(RsaPrivateKey::from_pkcs1_der(pem.contents())?),
        PRIVATE_KEY_TAG => Ok(RsaPrivateKey::from_pkcs8_der(pem.contents())?),
        other => Err(Error::KeyFormat(format!(
            "Unexpected PEM tag '{}' for a private key",
            other
        ))),
    }
}

/// Parse an SPKI or PKCS#1 public key
///
/// Non-RSA SPKI keys are rejected with [`Error::KeyFormat`].
pub fn parse_public_key_pem(input: &str) -> Result<RsaPublicKey> {
    let pem = pem::parse(input)?;
    match pem.tag() {
        PUBLIC_KEY_TAG => Ok(RsaPublicKey::from_public_key_der(pem.contents())?),
        RSA_PUBLIC_KEY_TAG => match RsaPublicKey::from_pkcs1_der(pem.contents()) {
            Ok(key) => Ok(key),
            Err(_) => Ok(RsaPublicKey::from_public_key_der(pem.contents())?),
        },
        other => Err(Error::KeyFormat(format!(
            "Unexpected PEM tag '{}' for a public key",
            other
        ))),
    }
}

//! Per-message security envelope
//!
//! Sender side: the decimal form of the value is encrypted with RSA-OAEP
//! (SHA-256, MGF1-SHA-256, no label) under the receiver's public key, and its
//! SHA-256 digest is signed with RSA-PSS (SHA-256, random salt of digest
//! length) under the sender's private key.
//!
//! Receiver side: decrypt, digest, verify, then parse. A bad signature is an
//! ordinary outcome ([`OpenOutcome::SignatureInvalid`]), not an error.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rsa::{Oaep, Pss, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::crypto::{parse_public_key_pem, KeyPair};
use crate::error::{Error, Result};

/// Encrypted and signed wire unit carrying one value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Base64 (standard alphabet) of the OAEP ciphertext
    ciphertext: String,

    /// PSS signature over SHA-256 of the plaintext serialization
    signature: Vec<u8>,

    /// PEM of the key that produced `signature`
    sender_public_key: String,
}

/// Result of opening an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// Decrypted and authenticated
    Verified(i32),

    /// Decrypted, but the signature does not match the claimed sender key
    SignatureInvalid,
}

impl Envelope {
    /// Rebuild an envelope received from the wire
    pub fn from_parts(ciphertext: String, signature: Vec<u8>, sender_public_key: String) -> Self {
        Self {
            ciphertext,
            signature,
            sender_public_key,
        }
    }

    pub fn ciphertext(&self) -> &str {
        &self.ciphertext
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn sender_public_key(&self) -> &str {
        &self.sender_public_key
    }

    /// Split into `(ciphertext, signature, sender_public_key)`
    pub fn into_parts(self) -> (String, Vec<u8>, String) {
        (self.ciphertext, self.signature, self.sender_public_key)
    }
}

// Both sides build their padding here so sign and verify cannot drift apart.
fn encryption_padding() -> Oaep {
    Oaep::new::<Sha256>()
}

fn signature_padding() -> Pss {
    Pss::new::<Sha256>()
}

fn digest(serialized: &[u8]) -> [u8; 32] {
    Sha256::digest(serialized).into()
}

/// Encrypt and sign `value` for the holder of `receiver_public_key`
pub fn seal(value: i32, receiver_public_key: &RsaPublicKey, sender: &KeyPair) -> Result<Envelope> {
    seal_payload(value.to_string().as_bytes(), receiver_public_key, sender)
}

pub(crate) fn seal_payload(
    payload: &[u8],
    receiver_public_key: &RsaPublicKey,
    sender: &KeyPair,
) -> Result<Envelope> {
    let ciphertext = receiver_public_key
        .encrypt(&mut OsRng, encryption_padding(), payload)
        .map_err(|e| Error::Encryption(e.to_string()))?;

    let signature = sender
        .private_key()
        .sign_with_rng(&mut OsRng, signature_padding(), &digest(payload))
        .map_err(|e| Error::Encryption(format!("Signing failed: {}", e)))?;

    Ok(Envelope {
        ciphertext: BASE64.encode(ciphertext),
        signature,
        sender_public_key: sender.public_key_pem()?,
    })
}

/// Decrypt `envelope` with the receiver's private key and check its signature
pub fn open(envelope: &Envelope, receiver_private_key: &RsaPrivateKey) -> Result<OpenOutcome> {
    let sender_public_key = parse_public_key_pem(&envelope.sender_public_key)?;

    let ciphertext = BASE64
        .decode(envelope.ciphertext.as_bytes())
        .map_err(|e| Error::Decryption(format!("Invalid base64 ciphertext: {}", e)))?;

    let plaintext = receiver_private_key
        .decrypt(encryption_padding(), &ciphertext)
        .map_err(|e| Error::Decryption(e.to_string()))?;

    if let Err(e) = sender_public_key.verify(
        signature_padding(),
        &digest(&plaintext),
        &envelope.signature,
    ) {
        debug!("PSS verification failed: {}", e);
        return Ok(OpenOutcome::SignatureInvalid);
    }

    parse_value(&plaintext).map(OpenOutcome::Verified)
}

/// Parse the canonical decimal form produced by [`seal`]
fn parse_value(plaintext: &[u8]) -> Result<i32> {
    let text = std::str::from_utf8(plaintext)
        .map_err(|_| Error::MalformedValue("Payload is not valid UTF-8".to_string()))?;

    let value: i32 = text
        .parse()
        .map_err(|e| Error::MalformedValue(format!("'{}': {}", text, e)))?;

    if value.to_string() != text {
        return Err(Error::MalformedValue(format!(
            "'{}' is not in canonical decimal form",
            text
        )));
    }

    Ok(value)
}

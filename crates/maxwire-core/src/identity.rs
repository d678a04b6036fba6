//! Sender identity selection
//!
//! The sender may sign each message with a different key pair. Which pair is
//! used for the message at a given position in the stream is decided by an
//! [`IdentityProvider`].

use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::crypto::KeyPair;
use crate::error::Result;
use crate::keystore::KeyStore;

/// Maps a message's sequence index to the key pair that signs it
pub trait IdentityProvider: Send + Sync {
    fn identity_for_sequence_index(&self, index: usize) -> Result<Arc<KeyPair>>;
}

/// The same identity for every message
#[derive(Debug, Clone)]
pub struct FixedIdentity(Arc<KeyPair>);

impl FixedIdentity {
    pub fn new(pair: KeyPair) -> Self {
        Self(Arc::new(pair))
    }
}

impl IdentityProvider for FixedIdentity {
    fn identity_for_sequence_index(&self, _index: usize) -> Result<Arc<KeyPair>> {
        Ok(Arc::clone(&self.0))
    }
}

/// A new key store identity every `every` messages
///
/// Message `i` is signed by the pair named `{prefix}{i / every}`, created on
/// first use.
#[derive(Debug, Clone)]
pub struct RotatingIdentity {
    store: KeyStore,
    prefix: String,
    every: NonZeroUsize,
}

impl RotatingIdentity {
    pub fn new(store: KeyStore, prefix: impl Into<String>, every: NonZeroUsize) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            every,
        }
    }

    /// Key name used for the message at `index`
    pub fn key_name(&self, index: usize) -> String {
        format!("{}{}", self.prefix, index / self.every.get())
    }
}

impl IdentityProvider for RotatingIdentity {
    fn identity_for_sequence_index(&self, index: usize) -> Result<Arc<KeyPair>> {
        let pair = self.store.load_or_create(&self.key_name(index))?;
        Ok(Arc::new(pair))
    }
}

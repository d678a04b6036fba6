//! Error types for the maxwire core library

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Exactly one of the two key artifacts exists on disk
    #[error("Incomplete key pair '{name}': missing {}", .missing.display())]
    IncompleteKeyPair { name: String, missing: PathBuf },

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Key format error: {0}")]
    KeyFormat(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Malformed value: {0}")]
    MalformedValue(String),

    #[error("Negative value rejected: {0}")]
    NegativeValue(i32),

    #[error("Stream already closed")]
    StreamClosed,
}

impl Error {
    /// True for failures of the key directory or its files
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Error::Storage(_) | Error::Io(_) | Error::IncompleteKeyPair { .. }
        )
    }
}

impl From<rsa::pkcs1::Error> for Error {
    fn from(e: rsa::pkcs1::Error) -> Self {
        Error::KeyFormat(e.to_string())
    }
}

impl From<rsa::pkcs8::Error> for Error {
    fn from(e: rsa::pkcs8::Error) -> Self {
        Error::KeyFormat(e.to_string())
    }
}

impl From<rsa::pkcs8::spki::Error> for Error {
    fn from(e: rsa::pkcs8::spki::Error) -> Self {
        Error::KeyFormat(e.to_string())
    }
}

impl From<pem::PemError> for Error {
    fn from(e: pem::PemError) -> Self {
        Error::KeyFormat(e.to_string())
    }
}

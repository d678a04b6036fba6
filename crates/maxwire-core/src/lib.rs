//! Maxwire Core - Key material, message envelopes, and the running-max engine
//!
//! This crate holds everything both ends of a maxwire stream agree on: RSA key
//! pairs and their PEM storage, the encrypt-then-sign envelope around each
//! value, and the receiver-side aggregation state machine.

pub mod aggregator;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod keystore;
pub mod policy;

pub use aggregator::{Aggregator, AggregatorStats, StreamState};
pub use crypto::{KeyPair, DEFAULT_KEY_BITS};
pub use envelope::{open, seal, Envelope, OpenOutcome};
pub use error::{Error, Result};
pub use identity::{FixedIdentity, IdentityProvider, RotatingIdentity};
pub use keystore::KeyStore;
pub use policy::ValuePolicy;

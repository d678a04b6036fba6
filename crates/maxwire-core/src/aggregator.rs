//! Receiver-side running-maximum state machine
//!
//! One [`Aggregator`] serves exactly one stream. It opens each inbound
//! envelope, drops messages whose signature does not verify, and reports a
//! value only when it is strictly greater than everything seen before.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::crypto::KeyPair;
use crate::envelope::{self, Envelope, OpenOutcome};
use crate::error::{Error, Result};
use crate::policy::ValuePolicy;

/// Lifecycle of the stream an aggregator serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Open,
    Closed,
}

/// Counters kept for one stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    /// Envelopes handed to `observe`
    pub observed: u64,

    /// Envelopes dropped for a bad signature
    pub rejected: u64,

    /// New maxima reported back
    pub emitted: u64,
}

/// Running maximum over an authenticated, encrypted input sequence
#[derive(Debug)]
pub struct Aggregator {
    /// Receiver key pair, shared across connections
    receiver: Arc<KeyPair>,

    policy: ValuePolicy,

    /// `None` sits below every valid input
    running_max: Option<i32>,

    state: StreamState,

    stats: AggregatorStats,
}

impl Aggregator {
    pub fn new(receiver: Arc<KeyPair>, policy: ValuePolicy) -> Self {
        Self {
            receiver,
            policy,
            running_max: None,
            state: StreamState::Open,
            stats: AggregatorStats::default(),
        }
    }

    /// Consume one envelope, returning the new maximum if it raised it.
    ///
    /// A forged or corrupted signature yields `Ok(None)` and leaves the state
    /// untouched. Any error closes the aggregator.
    pub fn observe(&mut self, envelope: &Envelope) -> Result<Option<i32>> {
        if self.state == StreamState::Closed {
            return Err(Error::StreamClosed);
        }
        self.stats.observed += 1;

        let outcome = envelope::open(envelope, self.receiver.private_key())
            .and_then(|outcome| match outcome {
                OpenOutcome::Verified(value) => self.policy.check(value).map(Some),
                OpenOutcome::SignatureInvalid => Ok(None),
            });

        match outcome {
            Ok(Some(value)) => Ok(self.apply(value)),
            Ok(None) => {
                self.stats.rejected += 1;
                warn!(
                    index = self.stats.observed - 1,
                    "Signature verification failed, dropping message"
                );
                Ok(None)
            }
            Err(e) => {
                self.state = StreamState::Closed;
                Err(e)
            }
        }
    }

    fn apply(&mut self, value: i32) -> Option<i32> {
        match self.running_max {
            Some(max) if value <= max => {
                debug!("Value {} does not exceed running max {}", value, max);
                None
            }
            _ => {
                self.running_max = Some(value);
                self.stats.emitted += 1;
                debug!("New running max: {}", value);
                Some(value)
            }
        }
    }

    /// End the stream and return its counters
    pub fn close(&mut self) -> AggregatorStats {
        if self.state == StreamState::Open {
            self.state = StreamState::Closed;
            info!(
                observed = self.stats.observed,
                rejected = self.stats.rejected,
                emitted = self.stats.emitted,
                running_max = ?self.running_max,
                "Stream closed"
            );
        }
        self.stats
    }

    pub fn running_max(&self) -> Option<i32> {
        self.running_max
    }

    pub fn stats(&self) -> AggregatorStats {
        self.stats
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == StreamState::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::seal;

    const TEST_BITS: usize = 1024;

    struct Fixture {
        sender: KeyPair,
        receiver: Arc<KeyPair>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                sender: KeyPair::generate(TEST_BITS).unwrap(),
                receiver: Arc::new(KeyPair::generate(TEST_BITS).unwrap()),
            }
        }

        fn aggregator(&self, policy: ValuePolicy) -> Aggregator {
            Aggregator::new(Arc::clone(&self.receiver), policy)
        }

        fn seal(&self, value: i32) -> Envelope {
            seal(value, self.receiver.public_key(), &self.sender).unwrap()
        }

        fn feed(&self, aggregator: &mut Aggregator, values: &[i32]) -> Vec<i32> {
            values
                .iter()
                .filter_map(|&v| aggregator.observe(&self.seal(v)).unwrap())
                .collect()
        }
    }

    #[test]
    fn test_reference_sequence() {
        let f = Fixture::new();
        let mut aggregator = f.aggregator(ValuePolicy::default());

        let emitted = f.feed(&mut aggregator, &[1, 5, 3, 6, 2, 20]);
        assert_eq!(emitted, vec![1, 5, 6, 20]);
        assert_eq!(aggregator.running_max(), Some(20));
        assert_eq!(
            aggregator.stats(),
            AggregatorStats {
                observed: 6,
                rejected: 0,
                emitted: 4
            }
        );
    }

    #[test]
    fn test_increasing_sequence_emits_everything() {
        let f = Fixture::new();
        let mut aggregator = f.aggregator(ValuePolicy::default());
        assert_eq!(f.feed(&mut aggregator, &[0, 2, 4, 8]), vec![0, 2, 4, 8]);
    }

    #[test]
    fn test_non_increasing_sequence_emits_only_first() {
        let f = Fixture::new();
        let mut aggregator = f.aggregator(ValuePolicy::default());
        assert_eq!(f.feed(&mut aggregator, &[9, 9, 7, 3, 0]), vec![9]);
    }

    #[test]
    fn test_replayed_envelope_is_not_echoed() {
        let f = Fixture::new();
        let mut aggregator = f.aggregator(ValuePolicy::default());
        let envelope = f.seal(12);

        assert_eq!(aggregator.observe(&envelope).unwrap(), Some(12));
        assert_eq!(aggregator.observe(&envelope).unwrap(), None);
        assert_eq!(aggregator.stats().rejected, 0);
    }

    #[test]
    fn test_forged_sender_key_does_not_move_max() {
        let f = Fixture::new();
        let impostor = KeyPair::generate(TEST_BITS).unwrap();
        let mut aggregator = f.aggregator(ValuePolicy::default());

        assert_eq!(aggregator.observe(&f.seal(3)).unwrap(), Some(3));

        let (ciphertext, signature, _) = f.seal(100).into_parts();
        let forged = Envelope::from_parts(ciphertext, signature, impostor.public_key_pem().unwrap());

        assert_eq!(aggregator.observe(&forged).unwrap(), None);
        assert_eq!(aggregator.running_max(), Some(3));
        assert_eq!(aggregator.stats().rejected, 1);
        assert!(aggregator.is_open());
    }

    #[test]
    fn test_decryption_failure_closes_stream() {
        let f = Fixture::new();
        let mut aggregator = f.aggregator(ValuePolicy::default());

        // Addressed to someone else
        let stranger = KeyPair::generate(TEST_BITS).unwrap();
        let misaddressed = seal(5, stranger.public_key(), &f.sender).unwrap();

        let err = aggregator.observe(&misaddressed).unwrap_err();
        assert!(matches!(err, Error::Decryption(_)));
        assert_eq!(aggregator.state(), StreamState::Closed);
        assert!(matches!(
            aggregator.observe(&f.seal(1)),
            Err(Error::StreamClosed)
        ));
    }

    #[test]
    fn test_negative_values() {
        let f = Fixture::new();

        let mut strict = f.aggregator(ValuePolicy::NonNegative);
        assert!(matches!(
            strict.observe(&f.seal(-4)),
            Err(Error::NegativeValue(-4))
        ));
        assert!(!strict.is_open());

        let mut lenient = f.aggregator(ValuePolicy::AnyValue);
        assert_eq!(f.feed(&mut lenient, &[-4, -9, -1]), vec![-4, -1]);
    }

    #[test]
    fn test_close_is_terminal() {
        let f = Fixture::new();
        let mut aggregator = f.aggregator(ValuePolicy::default());
        f.feed(&mut aggregator, &[4]);

        let stats = aggregator.close();
        assert_eq!(stats.emitted, 1);
        assert_eq!(aggregator.close(), stats);
        assert!(matches!(
            aggregator.observe(&f.seal(10)),
            Err(Error::StreamClosed)
        ));
        assert_eq!(aggregator.running_max(), Some(4));
    }
}

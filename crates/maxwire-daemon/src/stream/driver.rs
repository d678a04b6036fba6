//! Sender-side stream driver
//!
//! Runs the outbound flow (seal and send every value) and the inbound flow
//! (collect running-max updates) as two tasks over one stream, and joins them.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use maxwire_core::{seal, Envelope, IdentityProvider, ValuePolicy};
use rsa::RsaPublicKey;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{DaemonError, Result};

use super::codec::{finish, frame_reader, frame_writer, next_frame, read_frame, write_frame};
use super::types::{EnvelopeFrame, MaxUpdateFrame};

/// Default per-frame idle timeout
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of one driven stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamReport {
    /// Envelopes written
    pub sent: usize,

    /// Running-max updates received, in arrival order
    pub updates: Vec<i32>,
}

/// Policy check, identity lookup and sealing for one value
#[derive(Clone)]
struct Sealer {
    identity: Arc<dyn IdentityProvider>,
    receiver_public_key: Arc<RsaPublicKey>,
    policy: ValuePolicy,
}

impl Sealer {
    async fn seal(&self, index: usize, value: i32) -> Result<Envelope> {
        self.policy.check(value)?;

        // Key generation and RSA run on the blocking pool
        let sealer = self.clone();
        let envelope = tokio::task::spawn_blocking(move || {
            let sender = sealer.identity.identity_for_sequence_index(index)?;
            seal(value, &sealer.receiver_public_key, &sender)
        })
        .await??;
        Ok(envelope)
    }
}

/// One item of the outbound flow
enum Outbound {
    /// Sealed just before it is sent
    Value(i32),
    Sealed(Envelope),
}

/// Drives one sender stream
#[derive(Clone)]
pub struct StreamDriver {
    sealer: Sealer,
    idle_timeout: Duration,
}

impl StreamDriver {
    pub fn new(identity: Arc<dyn IdentityProvider>, receiver_public_key: RsaPublicKey) -> Self {
        Self {
            sealer: Sealer {
                identity,
                receiver_public_key: Arc::new(receiver_public_key),
                policy: ValuePolicy::default(),
            },
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }

    pub fn with_policy(mut self, policy: ValuePolicy) -> Self {
        self.sealer.policy = policy;
        self
    }

    /// Bounds each frame write, and the wait for updates once every value
    /// has been sent
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Check and seal every value up front, in sequence order
    ///
    /// Fails on the first value the policy refuses, before any identity for
    /// it is created.
    pub async fn seal_all(&self, values: Vec<i32>) -> Result<Vec<Envelope>> {
        let mut envelopes = Vec::with_capacity(values.len());
        for (index, value) in values.into_iter().enumerate() {
            envelopes.push(self.sealer.seal(index, value).await?);
        }
        debug!(sealed = envelopes.len(), "Sealed all values");
        Ok(envelopes)
    }

    /// Send `values` over `stream` and collect every update the receiver
    /// reports. A failure in either flow cancels the other.
    ///
    /// Values are sealed as the stream goes, so the receiver waits on the
    /// sender's key generation between frames.
    pub async fn run<S>(&self, stream: S, values: Vec<i32>) -> Result<StreamReport>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.drive(stream, values.into_iter().map(Outbound::Value).collect())
            .await
    }

    /// Like [`run`](Self::run), for envelopes from [`seal_all`](Self::seal_all)
    pub async fn run_sealed<S>(&self, stream: S, envelopes: Vec<Envelope>) -> Result<StreamReport>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.drive(stream, envelopes.into_iter().map(Outbound::Sealed).collect())
            .await
    }

    async fn drive<S>(&self, stream: S, payload: Vec<Outbound>) -> Result<StreamReport>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (sending, outbound_done) = watch::channel(());

        let mut outbound = tokio::spawn(send_envelopes(
            writer,
            payload,
            self.sealer.clone(),
            self.idle_timeout,
            sending,
        ));
        let mut inbound = tokio::spawn(receive_updates(reader, self.idle_timeout, outbound_done));

        let joined = tokio::try_join!(join_flow(&mut outbound), join_flow(&mut inbound));
        if joined.is_err() {
            outbound.abort();
            inbound.abort();
        }

        let (sent, updates) = joined?;
        info!(sent, updates = updates.len(), "Stream complete");
        Ok(StreamReport { sent, updates })
    }
}

async fn join_flow<T>(handle: &mut JoinHandle<Result<T>>) -> Result<T> {
    match handle.await {
        Ok(result) => result,
        Err(e) => Err(e.into()),
    }
}

async fn timed<T>(idle_timeout: Duration, io: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(idle_timeout, io)
        .await
        .map_err(|_| DaemonError::Timeout)?
}

/// Outbound flow. Dropping `sending` on return tells the inbound flow that
/// no more updates are being provoked.
async fn send_envelopes<W>(
    writer: W,
    payload: Vec<Outbound>,
    sealer: Sealer,
    idle_timeout: Duration,
    sending: watch::Sender<()>,
) -> Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let mut frames = frame_writer(writer);
    let mut sent = 0;

    for (index, item) in payload.into_iter().enumerate() {
        let envelope = match item {
            Outbound::Value(value) => sealer.seal(index, value).await?,
            Outbound::Sealed(envelope) => envelope,
        };

        timed(idle_timeout, write_frame(&mut frames, &EnvelopeFrame::from(envelope))).await?;
        debug!(index, "Sent envelope");
        sent += 1;
    }

    timed(idle_timeout, finish(&mut frames)).await?;
    drop(sending);
    debug!(sent, "Outbound flow finished");
    Ok(sent)
}

/// Inbound flow. Silence only counts against `idle_timeout` once the
/// outbound flow is done; until then the receiver may simply have nothing
/// new to report.
async fn receive_updates<R>(
    reader: R,
    idle_timeout: Duration,
    mut outbound_done: watch::Receiver<()>,
) -> Result<Vec<i32>>
where
    R: AsyncRead + Unpin,
{
    let mut frames = frame_reader(reader);
    let mut updates = Vec::new();
    let mut sending = true;

    loop {
        let next = if sending {
            tokio::select! {
                next = next_frame::<MaxUpdateFrame, _>(&mut frames) => next?,
                _ = outbound_done.changed() => {
                    sending = false;
                    continue;
                }
            }
        } else {
            read_frame::<MaxUpdateFrame, _>(&mut frames, idle_timeout).await?
        };

        match next {
            Some(update) => {
                info!("New running max: {}", update.num);
                updates.push(update.num);
            }
            None => break,
        }
    }

    debug!("Inbound flow finished");
    Ok(updates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DaemonError;
    use crate::stream::server::handle_connection;
    use maxwire_core::{FixedIdentity, KeyPair};

    const TEST_BITS: usize = 1024;

    /// Takes `delay` to hand out each identity, like generating a fresh key
    struct SlowIdentity {
        inner: FixedIdentity,
        delay: Duration,
    }

    impl IdentityProvider for SlowIdentity {
        fn identity_for_sequence_index(&self, index: usize) -> maxwire_core::Result<Arc<KeyPair>> {
            std::thread::sleep(self.delay);
            self.inner.identity_for_sequence_index(index)
        }
    }

    fn driver(receiver: &KeyPair) -> StreamDriver {
        let sender = FixedIdentity::new(KeyPair::generate(TEST_BITS).unwrap());
        StreamDriver::new(Arc::new(sender), receiver.public_key().clone())
            .with_idle_timeout(Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_run_against_receiver() {
        let receiver = Arc::new(KeyPair::generate(TEST_BITS).unwrap());
        let (client, server) = tokio::io::duplex(64 * 1024);

        let serve = tokio::spawn(handle_connection(
            server,
            Arc::clone(&receiver),
            ValuePolicy::NonNegative,
            Duration::from_secs(10),
        ));

        let report = driver(&receiver)
            .run(client, vec![1, 5, 3, 6, 2, 20])
            .await
            .unwrap();

        assert_eq!(report.sent, 6);
        assert_eq!(report.updates, vec![1, 5, 6, 20]);

        let stats = serve.await.unwrap().unwrap();
        assert_eq!(stats.observed, 6);
        assert_eq!(stats.emitted, 4);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let receiver = Arc::new(KeyPair::generate(TEST_BITS).unwrap());
        let (client, server) = tokio::io::duplex(1024);

        let serve = tokio::spawn(handle_connection(
            server,
            Arc::clone(&receiver),
            ValuePolicy::NonNegative,
            Duration::from_secs(10),
        ));

        let report = driver(&receiver).run(client, Vec::new()).await.unwrap();
        assert_eq!(report, StreamReport::default());
        assert_eq!(serve.await.unwrap().unwrap().observed, 0);
    }

    #[tokio::test]
    async fn test_negative_value_rejected_before_sending() {
        let receiver = KeyPair::generate(TEST_BITS).unwrap();
        // Peer stays open so only the policy can end the run
        let (client, _server) = tokio::io::duplex(64 * 1024);

        let err = driver(&receiver).run(client, vec![3, -1]).await.unwrap_err();
        assert!(
            matches!(err, DaemonError::Core(maxwire_core::Error::NegativeValue(-1))),
            "got {:?}",
            err
        );
    }

    #[tokio::test]
    async fn test_silent_receiver_times_out() {
        let receiver = KeyPair::generate(TEST_BITS).unwrap();
        let (client, _server) = tokio::io::duplex(64 * 1024);

        let err = driver(&receiver)
            .with_idle_timeout(Duration::from_millis(200))
            .run(client, vec![1])
            .await
            .unwrap_err();
        assert!(matches!(err, DaemonError::Timeout), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_slow_sealing_outlasts_idle_timeout() {
        let receiver = Arc::new(KeyPair::generate(TEST_BITS).unwrap());
        let (client, server) = tokio::io::duplex(64 * 1024);

        let serve = tokio::spawn(handle_connection(
            server,
            Arc::clone(&receiver),
            ValuePolicy::NonNegative,
            Duration::from_secs(10),
        ));

        // Sending takes about 900ms with no new maximum after the first value
        let identity = SlowIdentity {
            inner: FixedIdentity::new(KeyPair::generate(TEST_BITS).unwrap()),
            delay: Duration::from_millis(150),
        };
        let report = StreamDriver::new(Arc::new(identity), receiver.public_key().clone())
            .with_idle_timeout(Duration::from_millis(400))
            .run(client, vec![9, 1, 1, 1, 1, 1])
            .await
            .unwrap();

        assert_eq!(report.sent, 6);
        assert_eq!(report.updates, vec![9]);
        assert_eq!(serve.await.unwrap().unwrap().observed, 6);
    }

    #[tokio::test]
    async fn test_run_sealed() {
        let receiver = Arc::new(KeyPair::generate(TEST_BITS).unwrap());
        let driver = driver(&receiver);
        let envelopes = driver.seal_all(vec![4, 2, 8]).await.unwrap();
        assert_eq!(envelopes.len(), 3);

        let (client, server) = tokio::io::duplex(64 * 1024);
        let serve = tokio::spawn(handle_connection(
            server,
            Arc::clone(&receiver),
            ValuePolicy::NonNegative,
            Duration::from_secs(10),
        ));

        let report = driver.run_sealed(client, envelopes).await.unwrap();
        assert_eq!(report.sent, 3);
        assert_eq!(report.updates, vec![4, 8]);
        assert_eq!(serve.await.unwrap().unwrap().rejected, 0);
    }

    #[tokio::test]
    async fn test_seal_all_stops_at_rejected_value() {
        let receiver = KeyPair::generate(TEST_BITS).unwrap();
        let err = driver(&receiver).seal_all(vec![1, -2, 3]).await.unwrap_err();
        assert!(matches!(
            err,
            DaemonError::Core(maxwire_core::Error::NegativeValue(-2))
        ));
    }
}

//! Receiver-side stream server

use std::sync::Arc;
use std::time::Duration;

use maxwire_core::{Aggregator, AggregatorStats, Envelope, KeyPair, ValuePolicy};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, info_span, Instrument, Span};
use uuid::Uuid;

use crate::error::Result;

use super::codec::{finish, frame_reader, frame_writer, read_frame, write_frame};
use super::connection::StreamTransport;
use super::tcp::TcpTransport;
use super::types::{EnvelopeFrame, MaxUpdateFrame};

/// Pause after a failed accept so a persistent error cannot spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Stream server
pub struct StreamServer {
    /// `host:port` to listen on
    address: String,

    /// Receiver key pair, shared by every connection
    receiver: Arc<KeyPair>,

    policy: ValuePolicy,

    idle_timeout: Duration,
}

impl StreamServer {
    /// Create a new stream server
    pub fn new(
        address: String,
        receiver: Arc<KeyPair>,
        policy: ValuePolicy,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            address,
            receiver,
            policy,
            idle_timeout,
        }
    }

    /// Bind the configured TCP address and serve until the task is dropped
    pub async fn run(&self) -> Result<()> {
        let transport = TcpTransport::bind(&self.address).await?;
        self.serve(transport).await
    }

    /// Accept connections from an already bound transport
    pub async fn serve<T: StreamTransport>(&self, transport: T) -> Result<()> {
        info!("Stream server listening on {}", transport.local_address()?);

        loop {
            match transport.accept().await {
                Ok(stream) => {
                    let receiver = Arc::clone(&self.receiver);
                    let policy = self.policy;
                    let idle_timeout = self.idle_timeout;
                    let span = info_span!("session", id = %Uuid::new_v4());

                    tokio::spawn(
                        async move {
                            debug!("Stream opened");
                            if let Err(e) =
                                handle_connection(stream, receiver, policy, idle_timeout).await
                            {
                                error!("Stream aborted: {}", e);
                            }
                        }
                        .instrument(span),
                    );
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

/// Run one stream to completion: feed every inbound envelope through a fresh
/// aggregator and answer each new maximum.
///
/// Returns the aggregator's counters once the peer finishes. The first fatal
/// error ends the stream without shutting down the write half.
pub async fn handle_connection<S>(
    stream: S,
    receiver: Arc<KeyPair>,
    policy: ValuePolicy,
    idle_timeout: Duration,
) -> Result<AggregatorStats>
where
    S: AsyncRead + AsyncWrite,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut inbound = frame_reader(reader);
    let mut outbound = frame_writer(writer);
    let mut aggregator = Aggregator::new(receiver, policy);

    while let Some(frame) = read_frame::<EnvelopeFrame, _>(&mut inbound, idle_timeout).await? {
        let envelope = Envelope::from(frame);

        // RSA work runs off the async workers; the aggregator travels with it
        let span = Span::current();
        let (returned, observed) = tokio::task::spawn_blocking(move || {
            let observed = span.in_scope(|| aggregator.observe(&envelope));
            (aggregator, observed)
        })
        .await?;
        aggregator = returned;

        if let Some(max) = observed? {
            write_frame(&mut outbound, &MaxUpdateFrame { num: max }).await?;
        }
    }

    let stats = aggregator.close();
    finish(&mut outbound).await?;
    Ok(stats)
}

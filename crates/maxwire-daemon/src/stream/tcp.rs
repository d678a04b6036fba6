//! TCP stream transport

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

use crate::error::{DaemonError, Result};

use super::connection::{StreamClientTransport, StreamTransport};

/// TCP server transport
pub struct TcpTransport {
    listener: TcpListener,
}

#[async_trait]
impl StreamTransport for TcpTransport {
    type Stream = TcpStream;

    async fn bind(address: &str) -> Result<Self> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| DaemonError::Stream(format!("Failed to bind {}: {}", address, e)))?;

        Ok(Self { listener })
    }

    async fn accept(&self) -> Result<Self::Stream> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(|e| DaemonError::Stream(format!("Accept failed: {}", e)))?;
        debug!("Accepted connection from {}", peer);
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn local_address(&self) -> Result<String> {
        Ok(self.listener.local_addr()?.to_string())
    }
}

/// TCP client transport
pub struct TcpClient;

#[async_trait]
impl StreamClientTransport for TcpClient {
    type Stream = TcpStream;

    async fn connect(address: &str) -> Result<Self::Stream> {
        let stream = TcpStream::connect(address).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                DaemonError::Stream(format!("Receiver not running at {}", address))
            } else {
                DaemonError::Stream(format!("Failed to connect to {}: {}", address, e))
            }
        })?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

//! Transport abstraction for stream endpoints

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// Server-side stream transport
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// The stream type for this transport
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Bind to `address` and start listening
    async fn bind(address: &str) -> Result<Self>
    where
        Self: Sized;

    /// Accept an incoming connection
    async fn accept(&self) -> Result<Self::Stream>;

    /// Address actually bound, useful when binding port 0
    fn local_address(&self) -> Result<String>;
}

/// Client-side stream transport
#[async_trait]
pub trait StreamClientTransport: Send + Sync {
    /// The stream type for this transport
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Connect to the receiver at `address`
    async fn connect(address: &str) -> Result<Self::Stream>;
}

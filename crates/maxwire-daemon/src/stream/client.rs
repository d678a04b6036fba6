//! Stream client for CLI use

use tracing::info;

use crate::error::Result;

use super::connection::StreamClientTransport;
use super::driver::{StreamDriver, StreamReport};
use super::tcp::TcpClient;

/// Dials the receiver and drives one stream over the connection
pub struct StreamClient {
    address: String,
    driver: StreamDriver,
}

impl StreamClient {
    /// Create a new stream client
    pub fn new(address: String, driver: StreamDriver) -> Self {
        Self { address, driver }
    }

    /// Send `values` and wait for both directions to finish
    ///
    /// Everything is sealed before dialing, so a rejected value never opens
    /// a connection and the receiver never waits on key generation.
    pub async fn send(&self, values: Vec<i32>) -> Result<StreamReport> {
        let envelopes = self.driver.seal_all(values).await?;

        let stream = TcpClient::connect(&self.address).await?;
        info!("Connected to receiver at {}", self.address);
        self.driver.run_sealed(stream, envelopes).await
    }
}

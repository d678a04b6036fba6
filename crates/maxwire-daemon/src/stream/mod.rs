//! Framed bidirectional streams between a sender and the receiver
//!
//! Frames are protobuf messages behind a length prefix. The sender writes
//! envelope frames and the receiver answers with a frame for every new
//! running maximum. Either side ends its direction by shutting down its
//! write half.

mod client;
mod codec;
mod connection;
mod driver;
mod server;
mod tcp;
mod types;

// Public API
pub use client::StreamClient;
pub use codec::{finish, frame_reader, frame_writer, next_frame, read_frame, write_frame, MAX_FRAME_LENGTH};
pub use connection::{StreamClientTransport, StreamTransport};
pub use driver::{StreamDriver, StreamReport};
pub use server::{handle_connection, StreamServer};
pub use tcp::{TcpClient, TcpTransport};
pub use types::{EnvelopeFrame, MaxUpdateFrame};

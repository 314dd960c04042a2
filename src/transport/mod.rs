//! Transport layer for Sphero communication.
//!
//! The protocol engine only needs an ordered byte pipe: a way to write
//! escaped packets, and a stream of raw chunks as they arrive. Framing is
//! done above the transport, so chunk boundaries carry no meaning.

pub mod channel;
pub mod serial;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::error::Result;

/// Trait for transport implementations.
pub trait Transport: Send + Sync {
    /// Connects to the device.
    fn connect(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Disconnects from the device.
    fn disconnect(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Writes raw (already framed and escaped) bytes to the device.
    fn write(&mut self, data: Bytes) -> BoxFuture<'_, Result<()>>;

    /// Returns true if connected.
    fn is_connected(&self) -> bool;

    /// Takes the stream of inbound raw chunks.
    ///
    /// Available once per connection, after [`Transport::connect`].
    fn take_incoming(&mut self) -> Option<mpsc::Receiver<Bytes>>;
}

pub use channel::{ChannelTransport, RemoteEnd};
pub use serial::SerialTransport;

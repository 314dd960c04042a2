//! In-memory transport backed by channels.
//!
//! [`ChannelTransport::pair`] returns the transport and its [`RemoteEnd`].
//! The remote end sees every byte the client writes and can inject inbound
//! bytes, which makes it the glue for an external BLE stack (forward GATT
//! notifications into it, write what comes out of it to the characteristic)
//! and a scriptable device for tests.
//!
//! Like the serial transport, every connection gets a fresh inbound stream,
//! and connecting while connected is a no-op.

use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::protocol::{FrameDecoder, Packet};
use crate::transport::Transport;

/// Sender feeding the current connection's inbound stream.
type InboundSlot = Arc<Mutex<Option<mpsc::Sender<Bytes>>>>;

/// Client side of an in-memory byte pipe.
pub struct ChannelTransport {
    capacity: usize,
    outgoing: mpsc::Sender<Bytes>,
    inbound: InboundSlot,
    incoming: Option<mpsc::Receiver<Bytes>>,
    connected: bool,
}

/// Device side of an in-memory byte pipe.
pub struct RemoteEnd {
    written: mpsc::Receiver<Bytes>,
    inbound: InboundSlot,
    decoder: FrameDecoder,
}

fn lock(slot: &InboundSlot) -> std::sync::MutexGuard<'_, Option<mpsc::Sender<Bytes>>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChannelTransport {
    /// Creates a disconnected pair with the given channel capacity.
    #[must_use]
    pub fn pair(capacity: usize) -> (Self, RemoteEnd) {
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let inbound = InboundSlot::default();

        let transport = Self {
            capacity,
            outgoing: out_tx,
            inbound: Arc::clone(&inbound),
            incoming: None,
            connected: false,
        };
        let remote = RemoteEnd {
            written: out_rx,
            inbound,
            decoder: FrameDecoder::new(),
        };
        (transport, remote)
    }
}

impl Transport for ChannelTransport {
    fn connect(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.connected {
                return Ok(());
            }

            let (tx, rx) = mpsc::channel(self.capacity);
            *lock(&self.inbound) = Some(tx);
            self.incoming = Some(rx);
            self.connected = true;
            Ok(())
        })
    }

    fn disconnect(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            lock(&self.inbound).take();
            self.incoming = None;
            self.connected = false;
            Ok(())
        })
    }

    fn write(&mut self, data: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if !self.connected {
                return Err(Error::NotConnected);
            }
            self.outgoing
                .send(data)
                .await
                .map_err(|_| Error::ChannelClosed)
        })
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn take_incoming(&mut self) -> Option<mpsc::Receiver<Bytes>> {
        self.incoming.take()
    }
}

impl RemoteEnd {
    /// Receives the next chunk written by the client.
    pub async fn recv_raw(&mut self) -> Option<Bytes> {
        self.written.recv().await
    }

    /// Receives and decodes the next packet written by the client.
    ///
    /// Malformed packets are skipped.
    pub async fn recv_packet(&mut self) -> Option<Packet> {
        loop {
            match self.decoder.decode() {
                Ok(Some(packet)) => return Some(packet),
                Ok(None) => {
                    let chunk = self.written.recv().await?;
                    self.decoder.feed(&chunk);
                }
                Err(e) => tracing::warn!("remote end dropped malformed packet: {}", e),
            }
        }
    }

    /// Injects raw bytes as if received from the device.
    ///
    /// Fails with [`Error::NotConnected`] when the client side has no open
    /// connection.
    pub async fn send(&self, data: impl Into<Bytes>) -> Result<()> {
        let tx = lock(&self.inbound).clone().ok_or(Error::NotConnected)?;
        tx.send(data.into()).await.map_err(|_| Error::ChannelClosed)
    }

    /// Ends the current inbound stream, as if the link was lost.
    pub fn close(&self) {
        lock(&self.inbound).take();
    }
}

//! Serial/UART transport implementation.
//!
//! For robots reached through a serial link or a BLE-to-UART bridge.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Default baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default connection delay.
pub const DEFAULT_CONNECTION_DELAY: Duration = Duration::from_millis(300);

/// Capacity of the inbound chunk channel.
const INCOMING_CAPACITY: usize = 256;

/// Configuration for serial transport.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0" or "COM3").
    pub port: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Delay after opening the port before sending commands.
    pub connection_delay: Duration,
}

impl SerialConfig {
    /// Creates a new serial configuration with default settings.
    #[must_use]
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            connection_delay: DEFAULT_CONNECTION_DELAY,
        }
    }

    /// Sets the baud rate.
    #[must_use]
    pub const fn baud_rate(mut self, rate: u32) -> Self {
        self.baud_rate = rate;
        self
    }

    /// Sets the connection delay.
    #[must_use]
    pub const fn connection_delay(mut self, delay: Duration) -> Self {
        self.connection_delay = delay;
        self
    }
}

/// Serial transport.
///
/// The read half is pumped by a background task into the incoming channel.
pub struct SerialTransport {
    config: SerialConfig,
    writer: Option<WriteHalf<SerialStream>>,
    incoming: Option<mpsc::Receiver<Bytes>>,
    pump: Option<JoinHandle<()>>,
}

impl SerialTransport {
    /// Creates a new serial transport with the given configuration.
    #[must_use]
    pub const fn new(config: SerialConfig) -> Self {
        Self {
            config,
            writer: None,
            incoming: None,
            pump: None,
        }
    }

    /// Creates a new serial transport for the given port with default settings.
    #[must_use]
    pub fn with_port(port: impl Into<String>) -> Self {
        Self::new(SerialConfig::new(port))
    }

    /// Forwards raw chunks from the port until it closes or the receiver is dropped.
    async fn pump(mut reader: ReadHalf<SerialStream>, tx: mpsc::Sender<Bytes>) -> Result<()> {
        let mut buf = [0u8; 1024];

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => {
                    tracing::debug!("serial port closed");
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::ConnectionReset,
                        "serial port closed",
                    )));
                }
                Ok(n) => n,
                Err(e) => return Err(Error::Io(e)),
            };

            tracing::trace!("received {n} bytes: {}", hex::encode(&buf[..n]));
            if tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                tracing::debug!("incoming receiver dropped");
                return Ok(());
            }
        }
    }
}

impl Transport for SerialTransport {
    fn connect(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.writer.is_some() {
                return Ok(());
            }

            tracing::info!("connecting to serial port: {}", self.config.port);

            let mut stream = tokio_serial::new(&self.config.port, self.config.baud_rate)
                .open_native_async()
                .map_err(Error::Serial)?;

            if let Err(e) = tokio_serial::SerialPort::write_request_to_send(&mut stream, false) {
                tracing::warn!("failed to set RTS: {}", e);
            }

            tokio::time::sleep(self.config.connection_delay).await;

            let (reader, writer) = tokio::io::split(stream);
            let (tx, rx) = mpsc::channel(INCOMING_CAPACITY);

            self.pump = Some(tokio::spawn(async move {
                if let Err(e) = Self::pump(reader, tx).await {
                    tracing::error!("serial read error: {}", e);
                }
            }));
            self.incoming = Some(rx);
            self.writer = Some(writer);

            tracing::info!("connected to serial port");
            Ok(())
        })
    }

    fn disconnect(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if let Some(pump) = self.pump.take() {
                pump.abort();
            }
            if self.writer.take().is_some() {
                tracing::info!("disconnected from serial port");
            }
            self.incoming = None;
            Ok(())
        })
    }

    fn write(&mut self, data: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let writer = self.writer.as_mut().ok_or(Error::NotConnected)?;

            tracing::trace!("writing {} bytes: {}", data.len(), hex::encode(&data));
            writer.write_all(&data).await?;
            writer.flush().await?;
            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    fn take_incoming(&mut self) -> Option<mpsc::Receiver<Bytes>> {
        self.incoming.take()
    }
}

/// Lists available serial ports.
pub fn list_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports().map_err(Error::Serial)?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_config_defaults() {
        let config = SerialConfig::new("/dev/ttyUSB0");
        assert_eq!(config.port, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.connection_delay, DEFAULT_CONNECTION_DELAY);
    }

    #[test]
    fn test_serial_config_builder() {
        let config = SerialConfig::new("/dev/ttyACM0")
            .baud_rate(9600)
            .connection_delay(Duration::from_secs(1));
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.connection_delay, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_write_requires_connection() {
        let mut transport = SerialTransport::with_port("/dev/null-port");
        assert!(!transport.is_connected());
        assert!(transport.take_incoming().is_none());
        let result = transport.write(Bytes::from_static(&[0x8D])).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[test]
    #[ignore = "Requires /sys/class/tty - not available in sandboxed builds"]
    fn test_list_ports() {
        let _ = list_ports();
    }
}

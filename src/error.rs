//! Error types for the sphero-mini library.

use thiserror::Error;

/// The main error type for sphero-mini operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame encoding/decoding error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Telemetry payload could not be decoded.
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    /// Protocol error from the device.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Command timed out waiting for response.
    #[error("command with sequence number {sequence} timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64, sequence: u8 },

    /// Every usable sequence number has a command outstanding.
    #[error("no free sequence number: all 255 slots are awaiting a response")]
    SequenceExhausted,

    /// Connection is not established.
    #[error("not connected")]
    NotConnected,

    /// Channel receive error.
    #[error("channel closed")]
    ChannelClosed,
}

/// Frame-specific errors.
///
/// All of these are local to the inbound stream: the offending packet is
/// dropped and decoding resumes at the next start marker.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Packet too short to contain the header and checksum.
    #[error("packet too short: need at least 5 bytes, got {0}")]
    TooShort(usize),

    /// Response packet without a response code byte.
    #[error("response packet for sequence number {0} has no response code")]
    MissingResponseCode(u8),

    /// A start marker arrived before the previous packet was terminated.
    #[error("truncated packet: {discarded} bytes discarded at unexpected start marker")]
    Truncated { discarded: usize },
}

/// Sensor stream decoding errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TelemetryError {
    /// Payload length does not match the configured field lists.
    #[error("sensor payload length mismatch: expected {expected} bytes, got {got}")]
    LengthMismatch { expected: usize, got: usize },
}

/// Result type alias for sphero-mini operations.
pub type Result<T> = std::result::Result<T, Error>;

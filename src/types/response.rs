//! Synchronous command responses.

use bytes::Bytes;

use crate::error::FrameError;
use crate::protocol::{Packet, ResponseCode};

/// The device's answer to a command.
///
/// Checksum and response code problems do not fail a command; they are
/// reported here and logged, and the payload is delivered regardless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Sequence number of the command.
    pub sequence: u8,
    /// Execution outcome.
    pub code: ResponseCode,
    /// Response payload (header, code and checksum stripped).
    pub payload: Bytes,
    /// False if the transmitted checksum did not match.
    pub checksum_valid: bool,
}

impl Response {
    /// Builds a response from a packet classified as a synchronous response.
    pub fn from_packet(packet: &Packet) -> Result<Self, FrameError> {
        let Some(&code) = packet.body.first() else {
            return Err(FrameError::MissingResponseCode(packet.sequence));
        };

        Ok(Self {
            sequence: packet.sequence,
            code: ResponseCode::from_byte(code),
            payload: packet.body.slice(1..),
            checksum_valid: packet.checksum_valid(),
        })
    }

    /// Returns true if the checksum or response code warrant a warning.
    #[must_use]
    pub const fn has_warnings(&self) -> bool {
        !self.checksum_valid || !self.code.is_ok()
    }
}

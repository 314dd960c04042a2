//! Packet framing for the Sphero API v2 protocol.
//!
//! The wire format is:
//! ```text
//! ┌───────┬───────┬───────────┬────────────┬─────────┬───────────┬──────────┬───────┐
//! │ 0x8D  │ flags │ device id │ command id │ seq no. │ payload…  │ checksum │ 0xD8  │
//! │ START │  1 B  │    1 B    │    1 B     │   1 B   │  n bytes  │   1 B    │ END   │
//! └───────┴───────┴───────────┴────────────┴─────────┴───────────┴──────────┴───────┘
//! ```
//! Everything between the markers is escaped (see [`codec`](super::codec)).
//! The checksum is the one's complement of the byte sum of the header and
//! payload.

use std::collections::VecDeque;

use bytes::{BufMut, Bytes, BytesMut};

use super::codec::{self, DecodeState, Token};
use crate::error::FrameError;

/// Header bytes: flags, device id, command id, sequence number.
pub const HEADER_SIZE: usize = 4;

/// Smallest unescaped packet: header plus checksum.
pub const MIN_PACKET_SIZE: usize = HEADER_SIZE + 1;

/// Computes the packet checksum over unescaped content bytes.
#[must_use]
pub fn checksum(content: &[u8]) -> u8 {
    let sum = content.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    !sum
}

/// An outbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPacket {
    /// Permission flags.
    pub flags: u8,
    /// Target device (virtual subsystem) id.
    pub device_id: u8,
    /// Command id within the device.
    pub command_id: u8,
    /// Sequence number used to correlate the response.
    pub sequence: u8,
    /// Command parameters.
    pub payload: Bytes,
}

impl CommandPacket {
    /// Creates a new command packet.
    #[must_use]
    pub fn new(
        flags: u8,
        device_id: u8,
        command_id: u8,
        sequence: u8,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            flags,
            device_id,
            command_id,
            sequence,
            payload: payload.into(),
        }
    }

    /// Encodes the command into escaped, delimited wire bytes.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut content = BytesMut::with_capacity(MIN_PACKET_SIZE + self.payload.len());
        content.put_u8(self.flags);
        content.put_u8(self.device_id);
        content.put_u8(self.command_id);
        content.put_u8(self.sequence);
        content.put_slice(&self.payload);
        content.put_u8(checksum(&content));

        // Worst case every byte is escaped.
        let mut wire = BytesMut::with_capacity(2 + content.len() * 2);
        wire.put_u8(codec::START);
        codec::escape_into(&content, &mut wire);
        wire.put_u8(codec::END);
        wire.freeze()
    }
}

/// A complete inbound packet, unescaped.
///
/// `body` holds everything between the header and the checksum. For a
/// synchronous response its first byte is the response code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Permission flags.
    pub flags: u8,
    /// Source device id.
    pub device_id: u8,
    /// Command id.
    pub command_id: u8,
    /// Sequence number (`0xFF` for unsolicited messages).
    pub sequence: u8,
    /// Bytes between header and checksum.
    pub body: Bytes,
    /// Transmitted checksum.
    pub checksum: u8,
    computed: u8,
}

impl Packet {
    /// Builds a packet from unescaped content (header, body, checksum).
    pub fn from_content(mut content: Bytes) -> Result<Self, FrameError> {
        if content.len() < MIN_PACKET_SIZE {
            return Err(FrameError::TooShort(content.len()));
        }

        let checksum_byte = content[content.len() - 1];
        let computed = checksum(&content[..content.len() - 1]);
        let header = content.split_to(HEADER_SIZE);
        content.truncate(content.len() - 1);

        Ok(Self {
            flags: header[0],
            device_id: header[1],
            command_id: header[2],
            sequence: header[3],
            body: content,
            checksum: checksum_byte,
            computed,
        })
    }

    /// Returns true if the transmitted checksum matches the content.
    #[must_use]
    pub const fn checksum_valid(&self) -> bool {
        self.checksum == self.computed
    }

    /// Returns the checksum computed over the received content.
    #[must_use]
    pub const fn computed_checksum(&self) -> u8 {
        self.computed
    }

    /// Returns the unescaped content (header, body and checksum), for diagnostics.
    #[must_use]
    pub fn to_content(&self) -> Vec<u8> {
        let mut content = Vec::with_capacity(MIN_PACKET_SIZE + self.body.len());
        content.extend_from_slice(&[self.flags, self.device_id, self.command_id, self.sequence]);
        content.extend_from_slice(&self.body);
        content.push(self.checksum);
        content
    }
}

/// Incremental packet decoder that handles partial data.
///
/// Bytes before the first start marker are discarded, so the decoder can be
/// fed a stream that begins mid-packet.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    state: DecodeState,
    buffer: BytesMut,
    ready: VecDeque<Result<Packet, FrameError>>,
}

impl FrameDecoder {
    /// Creates a new frame decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw stream bytes into the decoder.
    pub fn feed(&mut self, data: &[u8]) {
        for &byte in data {
            let (next, token) = self.state.step(byte);
            self.state = next;
            match token {
                Token::Skip => {}
                Token::Start => {
                    if !self.buffer.is_empty() {
                        let discarded = self.buffer.len();
                        self.buffer.clear();
                        self.ready.push_back(Err(FrameError::Truncated { discarded }));
                    }
                }
                Token::Byte(b) => self.buffer.put_u8(b),
                Token::End => {
                    let content = self.buffer.split().freeze();
                    self.ready.push_back(Packet::from_content(content));
                }
            }
        }
    }

    /// Returns the next complete packet.
    ///
    /// Returns `Ok(Some(packet))` if a packet was decoded, `Ok(None)` if more
    /// data is needed, or an error for a malformed packet. Errors never stall
    /// the decoder; call again to continue with the next packet.
    pub fn decode(&mut self) -> Result<Option<Packet>, FrameError> {
        self.ready.pop_front().transpose()
    }

    /// Returns the number of content bytes buffered for the current packet.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal state.
    pub fn clear(&mut self) {
        self.state = DecodeState::Idle;
        self.buffer.clear();
        self.ready.clear();
    }
}

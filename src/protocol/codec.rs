//! Byte stuffing for the API v2 wire format.
//!
//! Three byte values are reserved as structural markers. Any content byte
//! equal to one of them is sent as `ESCAPE, byte & 0x77`; the receiver
//! restores it with `byte | 0x88`.
//!
//! ```text
//! content   8D        D8        AB
//! wire      AB 05     AB 50     AB 23
//! ```

use bytes::{BufMut, BytesMut};

/// Start-of-packet marker.
pub const START: u8 = 0x8D;

/// End-of-packet marker.
pub const END: u8 = 0xD8;

/// Escape marker; the next byte is a stuffed content byte.
pub const ESCAPE: u8 = 0xAB;

const ESCAPE_MASK: u8 = 0x77;
const UNESCAPE_MASK: u8 = 0x88;

/// Returns true if `byte` must be escaped inside a packet.
#[must_use]
pub const fn is_reserved(byte: u8) -> bool {
    matches!(byte, START | END | ESCAPE)
}

/// Escapes `content` into `dst`. Markers are not added.
pub fn escape_into(content: &[u8], dst: &mut BytesMut) {
    dst.reserve(content.len());
    for &byte in content {
        if is_reserved(byte) {
            dst.put_u8(ESCAPE);
            dst.put_u8(byte & ESCAPE_MASK);
        } else {
            dst.put_u8(byte);
        }
    }
}

/// Escapes raw content bytes.
#[must_use]
pub fn escape(content: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(content.len());
    escape_into(content, &mut buf);
    buf.to_vec()
}

/// Receiver state between stream bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeState {
    /// Outside a packet; everything up to the next [`START`] is discarded.
    #[default]
    Idle,
    /// Inside a packet.
    InPacket,
    /// Inside a packet, the previous byte was [`ESCAPE`].
    EscapePending,
}

/// What a single stream byte meant to the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// Byte carried no information (noise before a start marker, or an escape).
    Skip,
    /// A packet started.
    Start,
    /// A content byte, already unescaped.
    Byte(u8),
    /// The current packet ended.
    End,
}

impl DecodeState {
    /// Advances the state machine by one stream byte.
    #[must_use]
    pub const fn step(self, byte: u8) -> (Self, Token) {
        match self {
            Self::Idle => {
                if byte == START {
                    (Self::InPacket, Token::Start)
                } else {
                    (Self::Idle, Token::Skip)
                }
            }
            Self::EscapePending => (Self::InPacket, Token::Byte(byte | UNESCAPE_MASK)),
            Self::InPacket => match byte {
                START => (Self::InPacket, Token::Start),
                END => (Self::Idle, Token::End),
                ESCAPE => (Self::EscapePending, Token::Skip),
                _ => (Self::InPacket, Token::Byte(byte)),
            },
        }
    }
}

/// Unescapes a run of stream bytes, returning the content bytes and the
/// state to resume from.
///
/// Packet boundaries are not reported; use [`DecodeState::step`] or
/// [`FrameDecoder`](super::FrameDecoder) when they matter.
#[must_use]
pub fn unescape(stream: &[u8], start: DecodeState) -> (Vec<u8>, DecodeState) {
    let mut state = start;
    let mut out = Vec::with_capacity(stream.len());
    for &byte in stream {
        let (next, token) = state.step(byte);
        state = next;
        if let Token::Byte(b) = token {
            out.push(b);
        }
    }
    (out, state)
}

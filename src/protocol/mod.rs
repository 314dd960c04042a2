//! Protocol definitions for Sphero API v2 communication.
//!
//! This module contains the low-level protocol types including:
//! - Byte escaping
//! - Packet encoding/decoding
//! - Packet classification
//! - Device and command ids
//! - Binary data parsing

pub mod codec;
pub mod command;
pub mod frame;
pub mod packet;
pub mod parser;

pub use codec::{DecodeState, END, ESCAPE, START, escape, unescape};
pub use command::{
    ApiCommand, DeviceId, DrivingCommand, Flags, PowerCommand, ResponseCode, SensorCommand,
    UserIoCommand,
};
pub use frame::{CommandPacket, FrameDecoder, Packet, checksum};
pub use packet::{ASYNC_SEQUENCE, MessageId, PacketClass};
pub use parser::{parse_battery_voltage, parse_collision};

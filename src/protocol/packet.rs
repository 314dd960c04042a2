//! Classification of inbound packets.
//!
//! Unsolicited messages are identified by their (device id, command id)
//! pair together with the reserved sequence number `0xFF`. Everything else
//! is a response to one of our commands.

use super::command::{DeviceId, PowerCommand, SensorCommand};
use super::frame::Packet;

/// Sequence number reserved for unsolicited messages.
pub const ASYNC_SEQUENCE: u8 = 0xFF;

/// A (device id, command id) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId {
    /// Device id.
    pub device_id: u8,
    /// Command id.
    pub command_id: u8,
}

impl MessageId {
    /// Creates a message id.
    #[must_use]
    pub const fn new(device_id: u8, command_id: u8) -> Self {
        Self {
            device_id,
            command_id,
        }
    }

    /// Returns the id of a packet.
    #[must_use]
    pub const fn of(packet: &Packet) -> Self {
        Self::new(packet.device_id, packet.command_id)
    }
}

/// Streamed sensor sample.
pub const SENSOR_DATA: MessageId = MessageId::new(
    DeviceId::Sensor as u8,
    SensorCommand::SensorStreamingData as u8,
);

/// Collision notification.
pub const COLLISION: MessageId = MessageId::new(
    DeviceId::Sensor as u8,
    SensorCommand::CollisionDetected as u8,
);

/// Sleep warning.
pub const WILL_SLEEP: MessageId =
    MessageId::new(DeviceId::Power as u8, PowerCommand::WillSleep as u8);

/// Sleep notification.
pub const DID_SLEEP: MessageId =
    MessageId::new(DeviceId::Power as u8, PowerCommand::DidSleep as u8);

/// What an inbound packet is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketClass {
    /// Streamed sensor sample.
    SensorData,
    /// Collision notification.
    Collision,
    /// Device is about to sleep.
    WillSleep,
    /// Device is now sleeping.
    DidSleep,
    /// Response to a command, correlated by sequence number.
    Response,
}

impl PacketClass {
    /// Classifies a packet.
    ///
    /// Collision notifications are recognised by id alone. The other
    /// unsolicited kinds also require the async sequence number, since the
    /// device answers an explicit command with the same ids and a regular
    /// sequence number.
    #[must_use]
    pub fn of(packet: &Packet) -> Self {
        let id = MessageId::of(packet);
        let unsolicited = packet.sequence == ASYNC_SEQUENCE;

        if id == COLLISION {
            Self::Collision
        } else if unsolicited && id == SENSOR_DATA {
            Self::SensorData
        } else if unsolicited && id == WILL_SLEEP {
            Self::WillSleep
        } else if unsolicited && id == DID_SLEEP {
            Self::DidSleep
        } else {
            Self::Response
        }
    }

    /// Returns true if this is an unsolicited message.
    #[must_use]
    pub const fn is_async(&self) -> bool {
        !matches!(self, Self::Response)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::protocol::frame::checksum;

    fn packet(device_id: u8, command_id: u8, sequence: u8) -> Packet {
        let mut content = vec![0x08, device_id, command_id, sequence];
        content.push(checksum(&content));
        Packet::from_content(Bytes::from(content)).unwrap()
    }

    #[test]
    fn test_classify_async() {
        assert_eq!(PacketClass::of(&packet(0x18, 0x02, 0xFF)), PacketClass::SensorData);
        assert_eq!(PacketClass::of(&packet(0x13, 0x19, 0xFF)), PacketClass::WillSleep);
        assert_eq!(PacketClass::of(&packet(0x13, 0x1A, 0xFF)), PacketClass::DidSleep);
        assert_eq!(PacketClass::of(&packet(0x18, 0x12, 0xFF)), PacketClass::Collision);
    }

    #[test]
    fn test_collision_ignores_sequence() {
        assert_eq!(PacketClass::of(&packet(0x18, 0x12, 0x04)), PacketClass::Collision);
    }

    #[test]
    fn test_echoed_ids_are_responses() {
        // Sending 0x13/0x19 ourselves yields a response with our sequence number.
        assert_eq!(PacketClass::of(&packet(0x13, 0x19, 0x05)), PacketClass::Response);
        assert_eq!(PacketClass::of(&packet(0x18, 0x02, 0x00)), PacketClass::Response);
        assert_eq!(PacketClass::of(&packet(0x13, 0x0D, 0x00)), PacketClass::Response);
        assert!(!PacketClass::Response.is_async());
        assert!(PacketClass::DidSleep.is_async());
    }
}

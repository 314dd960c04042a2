//! Binary data parsing utilities for fixed-layout payloads.

use bytes::Buf;

use crate::error::{Error, Result};
use crate::types::{BatteryVoltage, Collision, CollisionAxes};

/// Minimum collision payload: x, y, z, axis, x and y magnitude.
const COLLISION_MIN_LEN: usize = 11;

/// Collision payload including speed and timestamp.
const COLLISION_FULL_LEN: usize = 16;

/// Parses a collision notification payload.
///
/// The trailing speed and timestamp fields are optional; some firmware
/// versions send only the first 11 bytes.
pub fn parse_collision(data: &[u8]) -> Result<Collision> {
    if data.len() < COLLISION_MIN_LEN {
        return Err(Error::Protocol {
            message: format!("collision payload too short: {} bytes", data.len()),
        });
    }

    let mut cursor = std::io::Cursor::new(data);

    let x = cursor.get_i16();
    let y = cursor.get_i16();
    let z = cursor.get_i16();
    let axis = CollisionAxes(cursor.get_u8());
    let x_magnitude = cursor.get_i16();
    let y_magnitude = cursor.get_i16();

    let (speed, timestamp) = if data.len() >= COLLISION_FULL_LEN {
        (Some(cursor.get_u8()), Some(cursor.get_u32()))
    } else {
        (None, None)
    };

    Ok(Collision {
        x,
        y,
        z,
        axis,
        x_magnitude,
        y_magnitude,
        speed,
        timestamp,
    })
}

/// Parses the battery voltage response.
///
/// Format: `[centivolts:2BE]`
pub fn parse_battery_voltage(data: &[u8]) -> Result<BatteryVoltage> {
    if data.len() < 2 {
        return Err(Error::Protocol {
            message: format!("battery voltage too short: {} bytes", data.len()),
        });
    }

    Ok(BatteryVoltage {
        centivolts: i16::from_be_bytes([data[0], data[1]]),
    })
}

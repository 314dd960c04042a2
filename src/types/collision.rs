//! Collision notification record.

/// Axes whose threshold was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollisionAxes(pub u8);

impl CollisionAxes {
    /// Left/right axis.
    pub const X: u8 = 0x01;
    /// Forward/backward axis.
    pub const Y: u8 = 0x02;

    /// Returns true if the X threshold was exceeded.
    #[must_use]
    pub const fn x(self) -> bool {
        self.0 & Self::X != 0
    }

    /// Returns true if the Y threshold was exceeded.
    #[must_use]
    pub const fn y(self) -> bool {
        self.0 & Self::Y != 0
    }
}

/// A collision reported by the device.
///
/// Format:
/// ```text
/// [x:2BE] [y:2BE] [z:2BE] [axis:1] [x_mag:2BE] [y_mag:2BE] ([speed:1] [timestamp:4BE])
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collision {
    /// X impact component, normalized.
    pub x: i16,
    /// Y impact component, normalized.
    pub y: i16,
    /// Z impact component, normalized.
    pub z: i16,
    /// Axes that triggered the event.
    pub axis: CollisionAxes,
    /// Power that crossed the X threshold.
    pub x_magnitude: i16,
    /// Power that crossed the Y threshold.
    pub y_magnitude: i16,
    /// Speed at impact, when reported.
    pub speed: Option<u8>,
    /// Device millisecond timer at impact, when reported.
    pub timestamp: Option<u32>,
}

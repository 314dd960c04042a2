//! Sensor streaming field tables and mask-driven sample decoding.
//!
//! The device streams sensor samples whose content is selected by two
//! independent 32-bit masks. Each set bit selects one field; the sample
//! payload holds one big-endian `f32` per selected field, group 1 first,
//! each group in descending bit order.
//!
//! Field names are the snake_case forms of the names used by the reference
//! firmware tooling: `locatorX` is `locator_x`, `rotationRatePitch` is
//! `rotation_rate_pitch`, `verticalAcceleration` is
//! `vertical_acceleration`. Placeholder names (`unknown1` and so on) are
//! unchanged.

use std::sync::Arc;

use bytes::Buf;
use tokio::sync::watch;

use crate::error::TelemetryError;

/// Width of every streamed field in bytes.
pub const FIELD_WIDTH: usize = 4;

/// One position in a mask group table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name.
    pub name: &'static str,
    /// True for positions with no known meaning.
    pub reserved: bool,
}

const fn field(name: &'static str) -> FieldDescriptor {
    FieldDescriptor {
        name,
        reserved: false,
    }
}

const RESERVED: FieldDescriptor = FieldDescriptor {
    name: "reserved",
    reserved: true,
};

/// Group 1 fields, indexed from bit 31 down to bit 0.
pub static GROUP1_FIELDS: [FieldDescriptor; 32] = [
    RESERVED,                         // 0x8000_0000
    RESERVED,                         // 0x4000_0000
    RESERVED,                         // 0x2000_0000
    RESERVED,                         // 0x1000_0000
    RESERVED,                         // 0x0800_0000
    RESERVED,                         // 0x0400_0000
    field("unknown14"),               // 0x0200_0000
    field("unknown13"),               // 0x0100_0000
    field("unknown12"),               // 0x0080_0000
    field("unknown11"),               // 0x0040_0000
    RESERVED,                         // 0x0020_0000
    RESERVED,                         // 0x0010_0000
    RESERVED,                         // 0x0008_0000
    field("pitch"),                   // 0x0004_0000, degrees (-180 to 180)
    field("roll"),                    // 0x0002_0000, degrees (-180 to 180)
    field("yaw"),                     // 0x0001_0000, degrees (-180 to 180)
    field("unknown10"),               // 0x0000_8000
    field("unknown9"),                // 0x0000_4000
    field("unknown8"),                // 0x0000_2000
    field("rotation_rate_pitch"),     // 0x0000_1000, 0.1 degrees per second
    field("rotation_rate_roll"),      // 0x0000_0800, 0.1 degrees per second
    field("rotation_rate_yaw"),       // 0x0000_0400, 0.1 degrees per second
    field("unknown7"),                // 0x0000_0200
    RESERVED,                         // 0x0000_0100
    RESERVED,                         // 0x0000_0080
    field("locator_x"),               // 0x0000_0040
    field("locator_y"),               // 0x0000_0020
    field("unknown4"),                // 0x0000_0010
    field("unknown3"),                // 0x0000_0008
    field("unknown2"),                // 0x0000_0004, unknown3 * 100
    field("unknown1"),                // 0x0000_0002
    RESERVED,                         // 0x0000_0001
];

/// Group 2 fields, indexed from bit 31 down to bit 0.
pub static GROUP2_FIELDS: [FieldDescriptor; 32] = [
    field("unknown10"),               // 0x8000_0000
    field("unknown9"),                // 0x4000_0000
    field("unknown8"),                // 0x2000_0000
    field("unknown7"),                // 0x1000_0000
    field("unknown6"),                // 0x0800_0000
    RESERVED,                         // 0x0400_0000
    field("unknown5"),                // 0x0200_0000
    field("unknown4"),                // 0x0100_0000
    field("unknown3"),                // 0x0080_0000
    field("vertical_acceleration"),   // 0x0040_0000, in g
    field("unknown1"),                // 0x0020_0000
    RESERVED,                         // 0x0010_0000
    RESERVED,                         // 0x0008_0000
    RESERVED,                         // 0x0004_0000
    RESERVED,                         // 0x0002_0000
    RESERVED,                         // 0x0001_0000
    RESERVED,                         // 0x0000_8000
    RESERVED,                         // 0x0000_4000
    RESERVED,                         // 0x0000_2000
    RESERVED,                         // 0x0000_1000
    RESERVED,                         // 0x0000_0800
    RESERVED,                         // 0x0000_0400
    RESERVED,                         // 0x0000_0200
    RESERVED,                         // 0x0000_0100
    RESERVED,                         // 0x0000_0080
    RESERVED,                         // 0x0000_0040
    RESERVED,                         // 0x0000_0020
    RESERVED,                         // 0x0000_0010
    RESERVED,                         // 0x0000_0008
    RESERVED,                         // 0x0000_0004
    RESERVED,                         // 0x0000_0002
    RESERVED,                         // 0x0000_0001
];

/// One of the two independent mask groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskGroup {
    /// Configured by the streaming mask command.
    Group1,
    /// Configured by the extended streaming mask command.
    Group2,
}

impl MaskGroup {
    /// Returns the field table of this group.
    #[must_use]
    pub const fn fields(self) -> &'static [FieldDescriptor; 32] {
        match self {
            Self::Group1 => &GROUP1_FIELDS,
            Self::Group2 => &GROUP2_FIELDS,
        }
    }

    /// Returns the descriptor selected by `bit` (0 = least significant).
    #[must_use]
    pub fn descriptor(self, bit: u32) -> Option<&'static FieldDescriptor> {
        let index = 31usize.checked_sub(bit as usize)?;
        self.fields().get(index)
    }
}

/// Ordered fields selected by one mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveFieldList {
    group: MaskGroup,
    mask: u32,
    fields: Vec<&'static FieldDescriptor>,
}

impl ActiveFieldList {
    /// Builds the list for `mask`, most significant bit first.
    #[must_use]
    pub fn from_mask(group: MaskGroup, mask: u32) -> Self {
        let fields = group
            .fields()
            .iter()
            .enumerate()
            .filter(|(index, _)| mask & (1 << (31 - index)) != 0)
            .map(|(_, descriptor)| descriptor)
            .collect();

        Self {
            group,
            mask,
            fields,
        }
    }

    /// Returns an empty list.
    #[must_use]
    pub const fn empty(group: MaskGroup) -> Self {
        Self {
            group,
            mask: 0,
            fields: Vec::new(),
        }
    }

    /// Returns the group.
    #[must_use]
    pub const fn group(&self) -> MaskGroup {
        self.group
    }

    /// Returns the mask the list was built from.
    #[must_use]
    pub const fn mask(&self) -> u32 {
        self.mask
    }

    /// Returns the number of selected fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no field is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over the selected fields in payload order.
    pub fn iter(&self) -> impl Iterator<Item = &'static FieldDescriptor> + '_ {
        self.fields.iter().copied()
    }
}

/// A decoded field value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    /// Group the field belongs to.
    pub group: MaskGroup,
    /// Field name.
    pub name: &'static str,
    /// Value.
    pub value: f32,
}

/// A decoded sensor sample, in payload order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorSample {
    /// Readings in payload order.
    pub readings: Vec<SensorReading>,
}

impl SensorSample {
    /// Returns the first reading named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f32> {
        self.readings
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.value)
    }

    /// Returns the reading named `name` within `group`.
    #[must_use]
    pub fn get_in(&self, group: MaskGroup, name: &str) -> Option<f32> {
        self.readings
            .iter()
            .find(|r| r.group == group && r.name == name)
            .map(|r| r.value)
    }

    /// Returns the field names in payload order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.readings.iter().map(|r| r.name)
    }

    /// Returns the number of readings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Returns true if the sample holds no readings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// Immutable pair of active field lists describing the sample layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorLayout {
    group1: Arc<ActiveFieldList>,
    group2: Arc<ActiveFieldList>,
}

impl Default for SensorLayout {
    fn default() -> Self {
        Self {
            group1: Arc::new(ActiveFieldList::empty(MaskGroup::Group1)),
            group2: Arc::new(ActiveFieldList::empty(MaskGroup::Group2)),
        }
    }
}

impl SensorLayout {
    /// Creates a layout from both masks.
    #[must_use]
    pub fn new(group1_mask: u32, group2_mask: u32) -> Self {
        Self {
            group1: Arc::new(ActiveFieldList::from_mask(MaskGroup::Group1, group1_mask)),
            group2: Arc::new(ActiveFieldList::from_mask(MaskGroup::Group2, group2_mask)),
        }
    }

    /// Returns a copy with the list of `group` rebuilt from `mask`.
    #[must_use]
    pub fn with_mask(&self, group: MaskGroup, mask: u32) -> Self {
        let list = Arc::new(ActiveFieldList::from_mask(group, mask));
        match group {
            MaskGroup::Group1 => Self {
                group1: list,
                group2: Arc::clone(&self.group2),
            },
            MaskGroup::Group2 => Self {
                group1: Arc::clone(&self.group1),
                group2: list,
            },
        }
    }

    /// Returns the active list of `group`.
    #[must_use]
    pub fn fields(&self, group: MaskGroup) -> &ActiveFieldList {
        match group {
            MaskGroup::Group1 => &self.group1,
            MaskGroup::Group2 => &self.group2,
        }
    }

    /// Returns the payload length this layout expects.
    #[must_use]
    pub fn expected_len(&self) -> usize {
        FIELD_WIDTH * (self.group1.len() + self.group2.len())
    }

    /// Decodes a sample payload.
    ///
    /// Group 2 values start where group 1 values end.
    pub fn decode(&self, payload: &[u8]) -> Result<SensorSample, TelemetryError> {
        let expected = self.expected_len();
        if payload.len() != expected {
            return Err(TelemetryError::LengthMismatch {
                expected,
                got: payload.len(),
            });
        }

        let mut cursor = payload;
        let readings = self
            .group1
            .iter()
            .map(|d| (MaskGroup::Group1, d))
            .chain(self.group2.iter().map(|d| (MaskGroup::Group2, d)))
            .map(|(group, descriptor)| SensorReading {
                group,
                name: descriptor.name,
                value: cursor.get_f32(),
            })
            .collect();

        Ok(SensorSample { readings })
    }
}

/// Shared, replace-only holder of the current [`SensorLayout`].
///
/// Reconfiguring a mask publishes a new layout; decoders holding the
/// previous snapshot keep a consistent view.
#[derive(Debug)]
pub struct SensorMasks {
    layout: watch::Sender<Arc<SensorLayout>>,
}

impl Default for SensorMasks {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorMasks {
    /// Creates a holder with both masks cleared.
    #[must_use]
    pub fn new() -> Self {
        let (layout, _) = watch::channel(Arc::new(SensorLayout::default()));
        Self { layout }
    }

    /// Rebuilds the group 1 list from `mask`.
    pub fn set_group1_mask(&self, mask: u32) {
        self.set_mask(MaskGroup::Group1, mask);
    }

    /// Rebuilds the group 2 list from `mask`.
    pub fn set_group2_mask(&self, mask: u32) {
        self.set_mask(MaskGroup::Group2, mask);
    }

    /// Rebuilds the list of `group` from `mask`.
    pub fn set_mask(&self, group: MaskGroup, mask: u32) {
        self.layout.send_modify(|layout| {
            *layout = Arc::new(layout.with_mask(group, mask));
        });
        tracing::debug!("{group:?} sensor mask set to 0x{mask:08x}");
    }

    /// Returns the current layout snapshot.
    #[must_use]
    pub fn current(&self) -> Arc<SensorLayout> {
        Arc::clone(&self.layout.borrow())
    }
}

//! Device ids, command ids and header flags for the API v2 protocol.
//!
//! Commands are addressed to a virtual device id and a command id within
//! that device, optionally followed by parameters.

/// Virtual device ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeviceId {
    /// API processor (ping/echo).
    ApiProcessor = 0x10,
    /// Power management (wake, sleep, battery).
    Power = 0x13,
    /// Driving and motors.
    Driving = 0x16,
    /// Sensors, locator and collision detection.
    Sensor = 0x18,
    /// LEDs.
    UserIo = 0x1A,
}

impl From<DeviceId> for u8 {
    fn from(id: DeviceId) -> Self {
        id as Self
    }
}

/// API processor commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ApiCommand {
    /// Echo; used as a keep-alive.
    Ping = 0x00,
}

/// Power commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PowerCommand {
    /// Deep sleep; only recoverable on the charger.
    DeepSleep = 0x00,
    /// Soft sleep until the next wake.
    Sleep = 0x01,
    /// Battery voltage query.
    GetBatteryVoltage = 0x03,
    /// Wake from soft sleep.
    Wake = 0x0D,
    /// Unsolicited: the device will sleep soon.
    WillSleep = 0x19,
    /// Unsolicited: the device went to sleep.
    DidSleep = 0x1A,
}

/// Driving commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DrivingCommand {
    /// Raw left/right motor control.
    RawMotors = 0x01,
    /// Make the current heading zero.
    ResetYaw = 0x06,
    /// Drive with speed and heading.
    DriveWithHeading = 0x07,
    /// Enable or disable stabilization.
    SetStabilization = 0x0C,
}

/// Sensor commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SensorCommand {
    /// Configure the group 1 mask and streaming interval.
    SetSensorStreamingMask = 0x00,
    /// Unsolicited: streamed sensor sample.
    SensorStreamingData = 0x02,
    /// Configure the group 2 mask.
    SetExtendedSensorStreamingMask = 0x0C,
    /// Configure collision detection thresholds.
    ConfigureCollisionDetection = 0x11,
    /// Unsolicited: collision detected.
    CollisionDetected = 0x12,
    /// Zero the locator.
    ResetLocator = 0x13,
    /// Enable collision notifications.
    EnableCollisionAsync = 0x14,
}

/// User I/O commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum UserIoCommand {
    /// Set the LEDs selected by a bitmask.
    SetAllLeds = 0x0E,
}

macro_rules! impl_into_u8 {
    ($($ty:ty),*) => {
        $(impl From<$ty> for u8 {
            fn from(cmd: $ty) -> Self {
                cmd as Self
            }
        })*
    };
}

impl_into_u8!(ApiCommand, PowerCommand, DrivingCommand, SensorCommand, UserIoCommand);

/// Header flags byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Flags(pub u8);

impl Flags {
    /// Packet is a response.
    pub const IS_RESPONSE: Self = Self(0x01);
    /// Sender wants a response.
    pub const REQUESTS_RESPONSE: Self = Self(0x02);
    /// Sender wants a response only on error.
    pub const REQUESTS_ERROR_RESPONSE: Self = Self(0x04);
    /// Command counts as activity for the sleep timer.
    pub const RESETS_INACTIVITY_TIMEOUT: Self = Self(0x08);

    /// Flags used for ordinary commands.
    pub const DEFAULT: Self = Self(Self::REQUESTS_RESPONSE.0 | Self::RESETS_INACTIVITY_TIMEOUT.0);

    /// Returns true if all bits of `other` are set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the raw byte.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl std::ops::BitOr for Flags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl From<Flags> for u8 {
    fn from(flags: Flags) -> Self {
        flags.0
    }
}

/// Response code carried by a synchronous response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    /// Command succeeded.
    Ok,
    /// General, non-specific error.
    GeneralError,
    /// Received checksum failure.
    ChecksumFailure,
    /// Received command fragment.
    Fragment,
    /// Unknown command id.
    BadCommand,
    /// Command currently unsupported.
    Unsupported,
    /// Bad message format.
    BadMessage,
    /// Parameter value(s) invalid.
    InvalidParameter,
    /// Failed to execute command.
    ExecutionFailed,
    /// Unknown device id.
    BadDeviceId,
    /// RAM access needed but it is busy.
    MemoryBusy,
    /// Supplied password incorrect.
    BadPassword,
    /// Voltage too low for reflash.
    PowerNoGood,
    /// Illegal page number.
    PageIllegal,
    /// Page did not reprogram correctly.
    FlashFail,
    /// Main application corrupt.
    MainAppCorrupt,
    /// Message state machine timed out.
    MessageTimeout,
    /// Code not in the table.
    Unknown(u8),
}

impl ResponseCode {
    /// Parses a response code from a byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => Self::Ok,
            0x01 => Self::GeneralError,
            0x02 => Self::ChecksumFailure,
            0x03 => Self::Fragment,
            0x04 => Self::BadCommand,
            0x05 => Self::Unsupported,
            0x06 => Self::BadMessage,
            0x07 => Self::InvalidParameter,
            0x08 => Self::ExecutionFailed,
            0x09 => Self::BadDeviceId,
            0x0A => Self::MemoryBusy,
            0x0B => Self::BadPassword,
            0x31 => Self::PowerNoGood,
            0x32 => Self::PageIllegal,
            0x33 => Self::FlashFail,
            0x34 => Self::MainAppCorrupt,
            0x35 => Self::MessageTimeout,
            other => Self::Unknown(other),
        }
    }

    /// Returns the raw byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Ok => 0x00,
            Self::GeneralError => 0x01,
            Self::ChecksumFailure => 0x02,
            Self::Fragment => 0x03,
            Self::BadCommand => 0x04,
            Self::Unsupported => 0x05,
            Self::BadMessage => 0x06,
            Self::InvalidParameter => 0x07,
            Self::ExecutionFailed => 0x08,
            Self::BadDeviceId => 0x09,
            Self::MemoryBusy => 0x0A,
            Self::BadPassword => 0x0B,
            Self::PowerNoGood => 0x31,
            Self::PageIllegal => 0x32,
            Self::FlashFail => 0x33,
            Self::MainAppCorrupt => 0x34,
            Self::MessageTimeout => 0x35,
            Self::Unknown(byte) => byte,
        }
    }

    /// Returns true for [`ResponseCode::Ok`].
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

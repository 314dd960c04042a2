//! Data types for Sphero Mini entities.
//!
//! This module contains the core data structures used throughout the library:
//! - Command responses
//! - Sensor stream layouts and samples
//! - Collision records
//! - Device status

pub mod collision;
pub mod device;
pub mod response;
pub mod sensor;

pub use collision::{Collision, CollisionAxes};
pub use device::BatteryVoltage;
pub use response::Response;
pub use sensor::{
    ActiveFieldList, FieldDescriptor, MaskGroup, SensorLayout, SensorMasks, SensorReading,
    SensorSample,
};

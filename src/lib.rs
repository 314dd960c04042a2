//! # sphero-mini
//!
//! A Rust client library for the Sphero Mini robot.
//!
//! This library speaks the Sphero API v2 binary protocol: it frames and
//! escapes commands, correlates responses by sequence number, and turns
//! unsolicited device messages into events.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - Concurrent commands, matched to their responses by sequence number
//! - Event-driven handling of sensor streams, collisions and sleep notices
//! - Serial transport, plus an in-memory transport to bridge a BLE stack
//!
//! ## Quick Start
//!
//! ```no_run
//! use sphero_mini::{Event, SpheroMini};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sphero_mini::Error> {
//!     let mut client = SpheroMini::serial("/dev/ttyUSB0");
//!     client.connect().await?;
//!
//!     let battery = client.commands().battery_voltage().await?;
//!     println!("Battery: {:.2} V", battery.volts());
//!
//!     // Stream pitch, roll and yaw every 100 ms.
//!     let mut events = client.subscribe();
//!     client.commands().set_sensor_mask(100, 0x0007_0000).await?;
//!     while let Some(event) = events.recv().await {
//!         if let Event::SensorData(sample) = event {
//!             println!("yaw: {:?}", sample.get("yaw"));
//!         }
//!     }
//!
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`protocol`] - Wire level: byte escaping, packet framing, ids and parsers
//! - [`types`] - Data structures (responses, sensor layouts, collisions)
//! - [`pending`] - Sequence number allocation and response correlation
//! - [`transport`] - Transport implementations (serial, in-memory)
//! - [`event`] - Async event system for unsolicited messages
//! - [`commands`] - Command handler for device operations
//! - [`client`] - High-level [`SpheroMini`] client

pub mod client;
pub mod commands;
pub mod error;
pub mod event;
pub mod pending;
pub mod protocol;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::{ClientConfig, SpheroMini};
pub use commands::{CollisionConfig, CommandHandler};
pub use error::{Error, FrameError, Result, TelemetryError};
pub use event::{Event, EventDispatcher, EventFilter, EventKind, Subscription};
pub use pending::PendingRequests;
pub use protocol::{
    ASYNC_SEQUENCE, CommandPacket, DeviceId, Flags, FrameDecoder, MessageId, Packet, PacketClass,
    ResponseCode,
};
pub use transport::{
    ChannelTransport, RemoteEnd, SerialTransport, Transport, serial::SerialConfig,
    serial::list_ports,
};
pub use types::{
    BatteryVoltage, Collision, CollisionAxes, MaskGroup, Response, SensorLayout, SensorMasks,
    SensorReading, SensorSample,
};

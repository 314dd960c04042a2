//! Command handlers for Sphero operations.
//!
//! This module provides the request/response path ([`CommandHandler::send_command`])
//! and the named commands built on top of it, each a fixed payload layout.

use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::pending::PendingRequests;
use crate::protocol::{
    ApiCommand, CommandPacket, DeviceId, DrivingCommand, Flags, PowerCommand, SensorCommand,
    UserIoCommand, parse_battery_voltage,
};
use crate::transport::Transport;
use crate::types::{BatteryVoltage, MaskGroup, Response, SensorMasks};

/// Default command timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// LED selection bits for [`UserIoCommand::SetAllLeds`].
mod led {
    pub const BACK: u8 = 0x01;
    pub const ALL_RGB: u8 = 0x0F;
    pub const MAIN: u8 = 0x70;
}

/// Collision detection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionConfig {
    /// Detection method; `0x01` is the only one supported, `0x00` disables.
    pub method: u8,
    /// Threshold for the left/right axis; `0` disables the axis.
    pub x_threshold: u8,
    /// Speed-ranged addition to the X threshold.
    pub x_speed: u8,
    /// Threshold for the forward/backward axis; `0` disables the axis.
    pub y_threshold: u8,
    /// Speed-ranged addition to the Y threshold.
    pub y_speed: u8,
    /// Post-collision dead time in 10 ms steps.
    pub dead_time: u8,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            method: 0x01,
            x_threshold: 100,
            x_speed: 100,
            y_threshold: 100,
            y_speed: 100,
            dead_time: 10,
        }
    }
}

/// Command handler for Sphero operations.
pub struct CommandHandler<T> {
    transport: Arc<Mutex<T>>,
    pending: Arc<PendingRequests>,
    masks: Arc<SensorMasks>,
    timeout: Duration,
    flags: Flags,
}

impl<T> Clone for CommandHandler<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            pending: Arc::clone(&self.pending),
            masks: Arc::clone(&self.masks),
            timeout: self.timeout,
            flags: self.flags,
        }
    }
}

impl<T: Transport> CommandHandler<T> {
    /// Creates a new command handler.
    #[must_use]
    pub fn new(
        transport: Arc<Mutex<T>>,
        pending: Arc<PendingRequests>,
        masks: Arc<SensorMasks>,
    ) -> Self {
        Self {
            transport,
            pending,
            masks,
            timeout: DEFAULT_TIMEOUT,
            flags: Flags::DEFAULT,
        }
    }

    /// Sets the command timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Sets the flags used by the named commands.
    pub fn set_flags(&mut self, flags: Flags) {
        self.flags = flags;
    }

    /// Returns the command timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends a command and waits for the response with the same sequence number.
    ///
    /// A checksum mismatch or a non-zero response code is logged and flagged
    /// on the returned [`Response`], but does not fail the call.
    pub async fn send_command(
        &self,
        flags: Flags,
        device_id: u8,
        command_id: u8,
        payload: impl Into<Bytes>,
    ) -> Result<Response> {
        let request = self.pending.register()?;
        let sequence = request.sequence();
        let wire = CommandPacket::new(flags.bits(), device_id, command_id, sequence, payload)
            .encode();

        tracing::debug!(
            "sending 0x{device_id:02x}/0x{command_id:02x} seq {sequence}: {}",
            hex::encode(&wire)
        );

        {
            let mut transport = self.transport.lock().await;
            transport.write(wire).await?;
        }

        let packet = request.wait(self.timeout).await?;
        let response = Response::from_packet(&packet)?;

        if !response.checksum_valid {
            tracing::warn!(
                "checksum mismatch in response to seq {sequence}: got 0x{:02x}, expected 0x{:02x}",
                packet.checksum,
                packet.computed_checksum()
            );
        }
        if !response.code.is_ok() {
            tracing::warn!(
                "0x{device_id:02x}/0x{command_id:02x} seq {sequence} answered with {:?} (0x{:02x})",
                response.code,
                response.code.as_byte()
            );
        }

        Ok(response)
    }

    async fn run(
        &self,
        device: DeviceId,
        command: impl Into<u8>,
        payload: &[u8],
    ) -> Result<Response> {
        self.send_command(
            self.flags,
            device.into(),
            command.into(),
            Bytes::copy_from_slice(payload),
        )
        .await
    }

    // ==================== Power Commands ====================

    /// Pings the device; also postpones sleep.
    pub async fn ping(&self) -> Result<Response> {
        self.run(DeviceId::ApiProcessor, ApiCommand::Ping, &[]).await
    }

    /// Wakes the device. Needed before it reacts to other commands.
    pub async fn wake(&self) -> Result<Response> {
        self.run(DeviceId::Power, PowerCommand::Wake, &[]).await
    }

    /// Puts the device into soft sleep until [`wake`](Self::wake).
    pub async fn sleep(&self) -> Result<Response> {
        self.run(DeviceId::Power, PowerCommand::Sleep, &[]).await
    }

    /// Puts the device into deep sleep; it only recovers on the charger.
    pub async fn deep_sleep(&self) -> Result<Response> {
        self.run(DeviceId::Power, PowerCommand::DeepSleep, &[]).await
    }

    /// Reads the battery voltage.
    pub async fn battery_voltage(&self) -> Result<BatteryVoltage> {
        let response = self
            .run(DeviceId::Power, PowerCommand::GetBatteryVoltage, &[])
            .await?;
        parse_battery_voltage(&response.payload)
    }

    // ==================== Driving Commands ====================

    /// Enables or disables stabilization.
    pub async fn set_stabilization(&self, enabled: bool) -> Result<Response> {
        self.run(
            DeviceId::Driving,
            DrivingCommand::SetStabilization,
            &[u8::from(enabled)],
        )
        .await
    }

    /// Drives the left and right motors directly.
    pub async fn drive_raw_motor(
        &self,
        left_mode: u8,
        left_speed: u8,
        right_mode: u8,
        right_speed: u8,
    ) -> Result<Response> {
        self.run(
            DeviceId::Driving,
            DrivingCommand::RawMotors,
            &[left_mode, left_speed, right_mode, right_speed],
        )
        .await
    }

    /// Drives at `speed` towards `heading` degrees.
    pub async fn drive(&self, speed: u8, heading: u16) -> Result<Response> {
        let [hi, lo] = heading.to_be_bytes();
        self.run(
            DeviceId::Driving,
            DrivingCommand::DriveWithHeading,
            &[speed, hi, lo, 0x00],
        )
        .await
    }

    /// Makes the current heading the zero heading.
    pub async fn reset_aim(&self) -> Result<Response> {
        self.run(DeviceId::Driving, DrivingCommand::ResetYaw, &[])
            .await
    }

    // ==================== LED Commands ====================

    /// Sets the main LED color.
    pub async fn set_main_led(&self, red: u8, green: u8, blue: u8) -> Result<Response> {
        self.run(
            DeviceId::UserIo,
            UserIoCommand::SetAllLeds,
            &[0x00, led::MAIN, red, green, blue],
        )
        .await
    }

    /// Sets color and intensity of all RGB LEDs.
    pub async fn set_led_colors(
        &self,
        intensity: u8,
        red: u8,
        green: u8,
        blue: u8,
    ) -> Result<Response> {
        self.run(
            DeviceId::UserIo,
            UserIoCommand::SetAllLeds,
            &[0x00, led::ALL_RGB, intensity, red, green, blue],
        )
        .await
    }

    /// Sets the back (aiming) LED intensity.
    pub async fn set_back_led(&self, intensity: u8) -> Result<Response> {
        self.run(
            DeviceId::UserIo,
            UserIoCommand::SetAllLeds,
            &[0x00, led::BACK, intensity],
        )
        .await
    }

    // ==================== Sensor Commands ====================

    /// Configures collision detection.
    pub async fn configure_collision_detection(
        &self,
        config: CollisionConfig,
    ) -> Result<Response> {
        self.run(
            DeviceId::Sensor,
            SensorCommand::ConfigureCollisionDetection,
            &[
                config.method,
                config.x_threshold,
                config.x_speed,
                config.y_threshold,
                config.y_speed,
                config.dead_time,
            ],
        )
        .await
    }

    /// Enables collision notifications.
    ///
    /// Current firmware sends them once detection is configured.
    pub async fn enable_collision_detection(&self) -> Result<Response> {
        self.run(DeviceId::Sensor, SensorCommand::EnableCollisionAsync, &[])
            .await
    }

    /// Zeroes the locator position.
    pub async fn reset_locator(&self) -> Result<Response> {
        self.run(DeviceId::Sensor, SensorCommand::ResetLocator, &[])
            .await
    }

    /// Sets the group 1 mask and the streaming interval in milliseconds.
    ///
    /// The local field list is rebuilt before the command is sent, so
    /// samples produced under the new mask decode correctly.
    pub async fn set_sensor_mask(&self, interval_ms: u16, mask: u32) -> Result<Response> {
        self.masks.set_mask(MaskGroup::Group1, mask);

        let mut payload = BytesMut::with_capacity(7);
        payload.put_u16(interval_ms);
        payload.put_u8(0x00);
        payload.put_u32(mask);

        self.run(
            DeviceId::Sensor,
            SensorCommand::SetSensorStreamingMask,
            &payload,
        )
        .await
    }

    /// Sets the group 2 mask.
    pub async fn configure_sensor_stream(&self, mask: u32) -> Result<Response> {
        self.masks.set_mask(MaskGroup::Group2, mask);

        self.run(
            DeviceId::Sensor,
            SensorCommand::SetExtendedSensorStreamingMask,
            &mask.to_be_bytes(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::protocol::{Packet, ResponseCode, checksum};
    use crate::transport::{ChannelTransport, RemoteEnd};

    fn handler() -> (CommandHandler<ChannelTransport>, RemoteEnd, Arc<PendingRequests>) {
        let (transport, remote) = ChannelTransport::pair(16);
        let pending = Arc::new(PendingRequests::new());
        let handler = CommandHandler::new(
            Arc::new(Mutex::new(transport)),
            Arc::clone(&pending),
            Arc::new(SensorMasks::new()),
        );
        (handler, remote, pending)
    }

    fn reply(request: &Packet, code: u8, payload: &[u8]) -> Packet {
        let mut content = vec![
            Flags::IS_RESPONSE.bits(),
            request.device_id,
            request.command_id,
            request.sequence,
            code,
        ];
        content.extend_from_slice(payload);
        content.push(checksum(&content));
        Packet::from_content(Bytes::from(content)).unwrap()
    }

    /// Answers one command and returns what was received.
    async fn answer(
        remote: &mut RemoteEnd,
        pending: &PendingRequests,
        code: u8,
        payload: &[u8],
    ) -> Packet {
        let request = remote.recv_packet().await.unwrap();
        pending.resolve(reply(&request, code, payload)).unwrap();
        request
    }

    async fn connected() -> (CommandHandler<ChannelTransport>, RemoteEnd, Arc<PendingRequests>) {
        let (handler, remote, pending) = handler();
        handler.transport.lock().await.connect().await.unwrap();
        (handler, remote, pending)
    }

    #[tokio::test]
    async fn test_wake_layout() {
        let (handler, mut remote, pending) = connected().await;

        let (response, request) = tokio::join!(handler.wake(), async {
            answer(&mut remote, &pending, 0x00, &[]).await
        });

        let response = response.unwrap();
        assert_eq!(request.flags, 0x0A);
        assert_eq!((request.device_id, request.command_id), (0x13, 0x0D));
        assert_eq!(request.sequence, 0);
        assert!(request.body.is_empty());
        assert_eq!(response.code, ResponseCode::Ok);
        assert!(!response.has_warnings());
    }

    #[tokio::test]
    async fn test_battery_voltage() {
        let (handler, mut remote, pending) = connected().await;

        let (battery, _) = tokio::join!(handler.battery_voltage(), async {
            answer(&mut remote, &pending, 0x00, &[0x01, 0xA4]).await
        });
        assert_eq!(battery.unwrap().centivolts, 420);
    }

    #[tokio::test]
    async fn test_drive_layout() {
        let (handler, mut remote, pending) = connected().await;

        let (_, request) = tokio::join!(handler.drive(60, 271), async {
            answer(&mut remote, &pending, 0x00, &[]).await
        });
        assert_eq!((request.device_id, request.command_id), (0x16, 0x07));
        assert_eq!(&request.body[..], &[60, 0x01, 0x0F, 0x00]);
    }

    #[tokio::test]
    async fn test_led_layouts() {
        let (handler, mut remote, pending) = connected().await;

        let (_, main) = tokio::join!(handler.set_main_led(0xFF, 0x00, 0x8D), async {
            answer(&mut remote, &pending, 0x00, &[]).await
        });
        assert_eq!(&main.body[..], &[0x00, 0x70, 0xFF, 0x00, 0x8D]);

        let (_, back) = tokio::join!(handler.set_back_led(0x20), async {
            answer(&mut remote, &pending, 0x00, &[]).await
        });
        assert_eq!(&back.body[..], &[0x00, 0x01, 0x20]);
        assert_eq!(back.sequence, 1);
    }

    #[tokio::test]
    async fn test_sensor_mask_rebuilds_group1() {
        let (handler, mut remote, pending) = connected().await;

        let (_, request) = tokio::join!(handler.set_sensor_mask(1000, 0x0000_0060), async {
            answer(&mut remote, &pending, 0x00, &[]).await
        });
        assert_eq!((request.device_id, request.command_id), (0x18, 0x00));
        assert_eq!(&request.body[..], &[0x03, 0xE8, 0x00, 0x00, 0x00, 0x00, 0x60]);

        let layout = handler.masks.current();
        let names: Vec<_> = layout.fields(MaskGroup::Group1).iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["locator_x", "locator_y"]);
    }

    #[tokio::test]
    async fn test_sensor_stream_rebuilds_group2() {
        let (handler, mut remote, pending) = connected().await;

        let (_, request) = tokio::join!(handler.configure_sensor_stream(0x0040_0000), async {
            answer(&mut remote, &pending, 0x00, &[]).await
        });
        assert_eq!((request.device_id, request.command_id), (0x18, 0x0C));
        assert_eq!(&request.body[..], &[0x00, 0x40, 0x00, 0x00]);
        assert_eq!(handler.masks.current().fields(MaskGroup::Group2).len(), 1);
    }

    #[tokio::test]
    async fn test_collision_config_defaults() {
        let (handler, mut remote, pending) = connected().await;

        let (_, request) = tokio::join!(
            handler.configure_collision_detection(CollisionConfig::default()),
            async { answer(&mut remote, &pending, 0x00, &[]).await }
        );
        assert_eq!((request.device_id, request.command_id), (0x18, 0x11));
        assert_eq!(&request.body[..], &[0x01, 100, 100, 100, 100, 10]);
    }

    #[tokio::test]
    async fn test_error_code_is_a_warning() {
        let (handler, mut remote, pending) = connected().await;

        let (response, _) = tokio::join!(handler.set_stabilization(true), async {
            answer(&mut remote, &pending, 0x02, &[]).await
        });
        let response = response.unwrap();
        assert_eq!(response.code, ResponseCode::ChecksumFailure);
        assert!(response.has_warnings());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_frees_sequence_number() {
        let (handler, mut remote, pending) = connected().await;

        let err = handler.ping().await.unwrap_err();
        assert!(matches!(err, Error::Timeout { sequence: 0, .. }));
        assert_eq!(pending.outstanding(), 0);
        let _ = remote.recv_packet().await.unwrap();

        // The next command gets the following number and still works.
        let (response, request) = tokio::join!(handler.ping(), async {
            answer(&mut remote, &pending, 0x00, &[]).await
        });
        assert!(response.is_ok());
        assert_eq!(request.sequence, 1);
    }

    #[tokio::test]
    async fn test_write_failure_releases_slot() {
        let (handler, _remote, pending) = handler();

        let err = handler.ping().await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
        assert_eq!(pending.outstanding(), 0);
    }
}

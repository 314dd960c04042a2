//! Main [`SpheroMini`] client implementation.
//!
//! This module provides the high-level [`SpheroMini`] client that combines
//! transport, request correlation, event handling and commands into a
//! unified interface.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::commands::{CommandHandler, DEFAULT_TIMEOUT};
use crate::error::{Error, Result};
use crate::event::{Event, EventDispatcher, Subscription};
use crate::pending::PendingRequests;
use crate::protocol::{Flags, FrameDecoder, Packet, PacketClass, parse_collision};
use crate::transport::{SerialTransport, Transport, serial::SerialConfig};
use crate::types::{MaskGroup, SensorMasks};

/// Default event channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Client configuration.
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    /// How long a command waits for its response.
    pub command_timeout: Duration,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
    /// Answer sleep warnings with a ping.
    pub stay_awake: bool,
    /// Flags sent with the named commands.
    pub flags: Flags,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            stay_awake: true,
            flags: Flags::DEFAULT,
        }
    }
}

impl ClientConfig {
    /// Sets the command timeout.
    #[must_use]
    pub const fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Sets the event channel capacity.
    #[must_use]
    pub const fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Enables or disables the stay-awake ping.
    #[must_use]
    pub const fn stay_awake(mut self, enabled: bool) -> Self {
        self.stay_awake = enabled;
        self
    }

    /// Sets the flags sent with the named commands.
    #[must_use]
    pub const fn flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }
}

/// Client for communicating with a Sphero Mini.
pub struct SpheroMini<T> {
    transport: Arc<Mutex<T>>,
    dispatcher: EventDispatcher,
    commands: CommandHandler<T>,
    pending: Arc<PendingRequests>,
    masks: Arc<SensorMasks>,
    config: ClientConfig,

    read_task: Option<JoinHandle<()>>,
}

impl SpheroMini<SerialTransport> {
    /// Creates a new client for a serial port.
    ///
    /// # Arguments
    ///
    /// * `port` - Serial port path (e.g., "/dev/ttyUSB0")
    ///
    /// # Returns
    ///
    /// A new client (not yet connected).
    #[must_use]
    pub fn serial(port: impl Into<String>) -> Self {
        Self::with_serial_config(SerialConfig::new(port))
    }

    /// Creates a new client with custom serial configuration.
    #[must_use]
    pub fn with_serial_config(config: SerialConfig) -> Self {
        Self::new(SerialTransport::new(config))
    }
}

impl<T: Transport + 'static> SpheroMini<T> {
    /// Creates a new client with the given transport.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    /// Creates a new client with the given transport and configuration.
    #[must_use]
    pub fn with_config(transport: T, config: ClientConfig) -> Self {
        let dispatcher = EventDispatcher::new(config.event_capacity);
        let transport = Arc::new(Mutex::new(transport));
        let pending = Arc::new(PendingRequests::new());
        let masks = Arc::new(SensorMasks::new());

        let mut commands = CommandHandler::new(
            Arc::clone(&transport),
            Arc::clone(&pending),
            Arc::clone(&masks),
        );
        commands.set_timeout(config.command_timeout);
        commands.set_flags(config.flags);

        Self {
            transport,
            dispatcher,
            commands,
            pending,
            masks,
            config,
            read_task: None,
        }
    }

    /// Connects to the device and wakes it.
    ///
    /// This will:
    /// 1. Open the transport connection
    /// 2. Start the background read task
    /// 3. Send `Wake`
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails to connect or the device does
    /// not answer the wake command.
    pub async fn connect(&mut self) -> Result<()> {
        let incoming = {
            let mut transport = self.transport.lock().await;
            transport.connect().await?;
            transport.take_incoming().ok_or_else(|| Error::Protocol {
                message: "transport has no inbound stream".into(),
            })?
        };

        self.start_read_loop(incoming);

        if let Err(e) = self.commands.wake().await {
            self.stop_read_loop();
            // Release the port and its inbound stream.
            if let Err(close_err) = self.transport.lock().await.disconnect().await {
                tracing::warn!("failed to close transport after wake error: {}", close_err);
            }
            return Err(e);
        }

        self.dispatcher.dispatch(Event::Connected);
        Ok(())
    }

    fn start_read_loop(&mut self, incoming: mpsc::Receiver<Bytes>) {
        let inbound = Inbound {
            transport: Arc::clone(&self.transport),
            pending: Arc::clone(&self.pending),
            masks: Arc::clone(&self.masks),
            dispatcher: self.dispatcher.clone(),
            keep_awake: self.config.stay_awake.then(|| self.commands.clone()),
        };

        self.read_task = Some(tokio::spawn(inbound.run(incoming)));
    }

    fn stop_read_loop(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
        self.pending.fail_all();
    }

    /// Disconnects from the device.
    ///
    /// Commands still waiting for a response fail with
    /// [`Error::ChannelClosed`].
    pub async fn disconnect(&mut self) -> Result<()> {
        self.stop_read_loop();

        {
            let mut transport = self.transport.lock().await;
            transport.disconnect().await?;
        }

        self.dispatcher.dispatch(Event::Disconnected);
        Ok(())
    }

    /// Returns true if connected.
    pub async fn is_connected(&self) -> bool {
        self.transport.lock().await.is_connected()
    }

    /// Returns the command handler for direct command access.
    #[must_use]
    pub const fn commands(&self) -> &CommandHandler<T> {
        &self.commands
    }

    /// Returns the event dispatcher.
    #[must_use]
    pub const fn events(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Subscribes to events.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.dispatcher.subscribe()
    }

    /// Returns the number of commands awaiting a response.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.pending.outstanding()
    }

    /// Rebuilds the group 1 field list without telling the device.
    ///
    /// For streams already configured by other means; use
    /// [`CommandHandler::set_sensor_mask`] to configure the device too.
    pub fn set_group1_mask(&self, mask: u32) {
        self.masks.set_mask(MaskGroup::Group1, mask);
    }

    /// Rebuilds the group 2 field list without telling the device.
    pub fn set_group2_mask(&self, mask: u32) {
        self.masks.set_mask(MaskGroup::Group2, mask);
    }
}

impl<T> Drop for SpheroMini<T> {
    fn drop(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
    }
}

/// State shared with the read task.
struct Inbound<T> {
    transport: Arc<Mutex<T>>,
    pending: Arc<PendingRequests>,
    masks: Arc<SensorMasks>,
    dispatcher: EventDispatcher,
    keep_awake: Option<CommandHandler<T>>,
}

impl<T: Transport + 'static> Inbound<T> {
    async fn run(self, mut incoming: mpsc::Receiver<Bytes>) {
        let mut decoder = FrameDecoder::new();

        while let Some(chunk) = incoming.recv().await {
            decoder.feed(&chunk);
            loop {
                match decoder.decode() {
                    Ok(Some(packet)) => self.process_packet(packet),
                    Ok(None) => break,
                    Err(e) => tracing::warn!("dropping malformed packet: {}", e),
                }
            }
        }

        tracing::debug!("inbound stream closed");
        self.pending.fail_all();
        if let Err(e) = self.transport.lock().await.disconnect().await {
            tracing::warn!("failed to close transport: {}", e);
        }
        self.dispatcher.dispatch(Event::Disconnected);
    }

    /// Routes one decoded packet to an event or a waiting command.
    fn process_packet(&self, packet: Packet) {
        let class = PacketClass::of(&packet);
        tracing::trace!(
            "0x{:02x}/0x{:02x} seq {} ({class:?}), {} body bytes",
            packet.device_id,
            packet.command_id,
            packet.sequence,
            packet.body.len()
        );

        let event = match class {
            PacketClass::SensorData => match self.masks.current().decode(&packet.body) {
                Ok(sample) => Event::SensorData(sample),
                Err(e) => {
                    tracing::warn!("failed to decode sensor data: {}", e);
                    Event::DecodeError {
                        message: e.to_string(),
                    }
                }
            },
            PacketClass::Collision => match parse_collision(&packet.body) {
                Ok(collision) => Event::Collision(collision),
                Err(e) => {
                    tracing::warn!("failed to parse collision: {}", e);
                    Event::DecodeError {
                        message: e.to_string(),
                    }
                }
            },
            PacketClass::WillSleep => {
                if let Some(commands) = &self.keep_awake {
                    let commands = commands.clone();
                    tokio::spawn(async move {
                        tracing::debug!("device about to sleep, sending ping");
                        if let Err(e) = commands.ping().await {
                            tracing::warn!("stay-awake ping failed: {}", e);
                        }
                    });
                }
                Event::WillSleep
            }
            PacketClass::DidSleep => Event::Sleeping,
            PacketClass::Response => {
                if let Err(packet) = self.pending.resolve(packet) {
                    tracing::warn!(
                        "unmatched sequence number {}: {}",
                        packet.sequence,
                        hex::encode(packet.to_content())
                    );
                }
                return;
            }
        };

        self.dispatcher.dispatch(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventFilter, EventKind};
    use crate::protocol::{
        ASYNC_SEQUENCE, CommandPacket, END, ResponseCode, START, checksum, escape,
    };
    use crate::transport::{ChannelTransport, RemoteEnd};

    /// Encodes a device-to-client packet.
    fn frame(device_id: u8, command_id: u8, sequence: u8, body: &[u8]) -> Bytes {
        CommandPacket::new(0x01, device_id, command_id, sequence, Bytes::copy_from_slice(body))
            .encode()
    }

    fn reply(request: &Packet, body: &[u8]) -> Bytes {
        frame(request.device_id, request.command_id, request.sequence, body)
    }

    /// Honors `RUST_LOG` when debugging a failing test.
    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    async fn connected(config: ClientConfig) -> (SpheroMini<ChannelTransport>, RemoteEnd) {
        init_tracing();
        let (transport, mut remote) = ChannelTransport::pair(32);
        let mut client = SpheroMini::with_config(transport, config);

        let (result, ()) = tokio::join!(client.connect(), async {
            let wake = remote.recv_packet().await.unwrap();
            assert_eq!((wake.device_id, wake.command_id), (0x13, 0x0D));
            remote.send(reply(&wake, &[0x00])).await.unwrap();
        });
        result.unwrap();
        (client, remote)
    }

    async fn next_event(sub: &mut Subscription) -> Event {
        tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_connect_wakes_device() {
        let (transport, mut remote) = ChannelTransport::pair(8);
        let mut client = SpheroMini::new(transport);
        let mut sub = client.subscribe();

        let (result, ()) = tokio::join!(client.connect(), async {
            let wake = remote.recv_packet().await.unwrap();
            assert_eq!(wake.flags, 0x0A);
            remote.send(reply(&wake, &[0x00])).await.unwrap();
        });
        result.unwrap();

        assert!(client.is_connected().await);
        assert_eq!(next_event(&mut sub).await, Event::Connected);
    }

    #[tokio::test]
    async fn test_responses_out_of_order() {
        let (client, mut remote) = connected(ClientConfig::default()).await;
        let commands = client.commands();

        let (battery, ping, ()) = tokio::join!(commands.battery_voltage(), commands.ping(), async {
            let first = remote.recv_packet().await.unwrap();
            let second = remote.recv_packet().await.unwrap();
            assert_ne!(first.sequence, second.sequence);

            let (battery, ping) = if first.device_id == 0x13 {
                (first, second)
            } else {
                (second, first)
            };
            // Answer in reverse order of sending, in one chunk.
            let mut chunk = reply(&ping, &[0x00]).to_vec();
            chunk.extend_from_slice(&reply(&battery, &[0x00, 0x01, 0x7C]));
            remote.send(chunk).await.unwrap();
        });

        assert_eq!(battery.unwrap().centivolts, 380);
        assert_eq!(ping.unwrap().code, ResponseCode::Ok);
        assert_eq!(client.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_bad_checksum_still_delivers_payload() {
        let (client, mut remote) = connected(ClientConfig::default()).await;

        let (response, ()) = tokio::join!(client.commands().ping(), async {
            let ping = remote.recv_packet().await.unwrap();
            let mut content = vec![0x01, ping.device_id, ping.command_id, ping.sequence, 0x00, 0x2A];
            content.push(checksum(&content) ^ 0x01);
            let mut wire = vec![START];
            wire.extend(escape(&content));
            wire.push(END);
            remote.send(wire).await.unwrap();
        });

        let response = response.unwrap();
        assert!(!response.checksum_valid);
        assert!(response.has_warnings());
        assert_eq!(&response.payload[..], &[0x2A]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_late_response_is_unmatched() {
        let config = ClientConfig::default().command_timeout(Duration::from_millis(100));
        let (client, mut remote) = connected(config).await;

        let err = client.commands().ping().await.unwrap_err();
        assert!(matches!(err, Error::Timeout { sequence: 1, .. }));

        // A late answer must not be handed to the next command.
        let late = remote.recv_packet().await.unwrap();
        let (response, ()) = tokio::join!(client.commands().ping(), async {
            let ping = remote.recv_packet().await.unwrap();
            assert_eq!(ping.sequence, 2);
            remote.send(reply(&late, &[0x07])).await.unwrap();
            remote.send(reply(&ping, &[0x00])).await.unwrap();
        });
        assert_eq!(response.unwrap().code, ResponseCode::Ok);
    }

    #[tokio::test]
    async fn test_sensor_stream_event() {
        let (client, remote) = connected(ClientConfig::default()).await;
        let mut sub = client.subscribe();

        // locator_x, locator_y, then vertical_acceleration from group 2.
        client.set_group1_mask(0x0000_0060);
        client.set_group2_mask(0x0040_0000);

        let mut body = Vec::new();
        body.extend_from_slice(&1.5f32.to_be_bytes());
        body.extend_from_slice(&(-2.0f32).to_be_bytes());
        body.extend_from_slice(&0.25f32.to_be_bytes());
        remote
            .send(frame(0x18, 0x02, ASYNC_SEQUENCE, &body))
            .await
            .unwrap();

        let Event::SensorData(sample) = next_event(&mut sub).await else {
            panic!("expected sensor data");
        };
        assert_eq!(
            sample.names().collect::<Vec<_>>(),
            vec!["locator_x", "locator_y", "vertical_acceleration"]
        );
        assert_eq!(sample.get("locator_x"), Some(1.5));
        assert_eq!(sample.get("locator_y"), Some(-2.0));
        assert_eq!(sample.get_in(MaskGroup::Group2, "vertical_acceleration"), Some(0.25));
    }

    #[tokio::test]
    async fn test_sensor_length_mismatch_is_reported() {
        let (client, remote) = connected(ClientConfig::default()).await;
        let mut sub = client.subscribe();
        client.set_group1_mask(0x0007_0000);

        remote
            .send(frame(0x18, 0x02, ASYNC_SEQUENCE, &[0; 8]))
            .await
            .unwrap();

        let event = next_event(&mut sub).await;
        assert_eq!(event.kind(), EventKind::DecodeError);
    }

    #[tokio::test]
    async fn test_collision_event() {
        let (client, remote) = connected(ClientConfig::default()).await;
        let mut sub = client.subscribe();

        let body = [
            0x00, 0x10, 0xFF, 0xF0, 0x00, 0x00, 0x03, 0x00, 0x40, 0x00, 0x20,
        ];
        // Collisions are matched by id only; the sequence number is ignored.
        remote.send(frame(0x18, 0x12, 0x05, &body)).await.unwrap();

        let Event::Collision(collision) = next_event(&mut sub).await else {
            panic!("expected collision");
        };
        assert_eq!(collision.x, 16);
        assert_eq!(collision.y, -16);
        assert!(collision.axis.x() && collision.axis.y());
        assert_eq!(collision.x_magnitude, 64);
        assert_eq!(collision.speed, None);
    }

    #[tokio::test]
    async fn test_will_sleep_sends_ping() {
        let (client, mut remote) = connected(ClientConfig::default()).await;
        let mut sub = client.subscribe();

        remote
            .send(frame(0x13, 0x19, ASYNC_SEQUENCE, &[]))
            .await
            .unwrap();
        assert_eq!(next_event(&mut sub).await, Event::WillSleep);

        let ping = remote.recv_packet().await.unwrap();
        assert_eq!((ping.device_id, ping.command_id), (0x10, 0x00));
        remote.send(reply(&ping, &[0x00])).await.unwrap();

        remote
            .send(frame(0x13, 0x1A, ASYNC_SEQUENCE, &[]))
            .await
            .unwrap();
        assert_eq!(next_event(&mut sub).await, Event::Sleeping);
    }

    #[tokio::test]
    async fn test_will_sleep_without_stay_awake() {
        let config = ClientConfig::default().stay_awake(false);
        let (client, mut remote) = connected(config).await;
        let mut sub = client.subscribe();

        remote
            .send(frame(0x13, 0x19, ASYNC_SEQUENCE, &[]))
            .await
            .unwrap();
        assert_eq!(next_event(&mut sub).await, Event::WillSleep);

        let nothing = tokio::time::timeout(Duration::from_millis(50), remote.recv_raw()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn test_wait_for_collision() {
        let (client, remote) = connected(ClientConfig::default()).await;
        let events = client.events().clone();
        let waiter = tokio::spawn(async move {
            events
                .wait_for(
                    EventFilter::kinds(vec![EventKind::Collision]),
                    Duration::from_secs(1),
                )
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        remote
            .send(frame(0x13, 0x1A, ASYNC_SEQUENCE, &[]))
            .await
            .unwrap();
        remote
            .send(frame(0x18, 0x12, ASYNC_SEQUENCE, &[0; 16]))
            .await
            .unwrap();

        let Some(Event::Collision(collision)) = waiter.await.unwrap() else {
            panic!("expected collision");
        };
        assert_eq!(collision.speed, Some(0));
        assert_eq!(collision.timestamp, Some(0));
    }

    #[tokio::test]
    async fn test_disconnect_fails_pending_commands() {
        let (mut client, mut remote) = connected(ClientConfig::default()).await;
        let mut sub = client.subscribe();
        let commands = client.commands().clone();

        let waiter = tokio::spawn(async move { commands.ping().await });
        let _ = remote.recv_packet().await.unwrap();

        client.disconnect().await.unwrap();
        assert!(matches!(waiter.await.unwrap(), Err(Error::ChannelClosed)));
        assert_eq!(next_event(&mut sub).await, Event::Disconnected);
        assert!(!client.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_retry_after_wake_timeout() {
        let (transport, mut remote) = ChannelTransport::pair(8);
        let config = ClientConfig::default().command_timeout(Duration::from_millis(50));
        let mut client = SpheroMini::with_config(transport, config);

        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, Error::Timeout { sequence: 0, .. }));
        assert!(!client.is_connected().await);
        let unanswered = remote.recv_packet().await.unwrap();
        assert_eq!(unanswered.sequence, 0);

        let (result, ()) = tokio::join!(client.connect(), async {
            let wake = remote.recv_packet().await.unwrap();
            assert_eq!((wake.device_id, wake.command_id), (0x13, 0x0D));
            assert_eq!(wake.sequence, 1);
            remote.send(reply(&wake, &[0x00])).await.unwrap();
        });
        result.unwrap();
        assert!(client.is_connected().await);
    }

    #[tokio::test]
    async fn test_lost_link_fails_fast() {
        let (client, remote) = connected(ClientConfig::default()).await;
        let mut sub = client.subscribe();

        remote.close();
        assert_eq!(next_event(&mut sub).await, Event::Disconnected);
        assert!(!client.is_connected().await);

        let err = tokio::time::timeout(Duration::from_secs(1), client.commands().ping())
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }
}

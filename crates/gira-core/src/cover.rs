//! Cover abstraction combining command delivery and position tracking.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;
use tracing::warn;

use gira_types::{Command, DeviceIdentity};

use crate::client::{ClientConfig, CoverClient};
use crate::error::{Error, Result};
use crate::events::{CoverEvent, EventDispatcher};
use crate::passive::{PassiveListener, PassiveListenerOptions};
use crate::transport::Transport;

/// One controllable cover.
///
/// Commands go through a [`CoverClient`]; the position comes from a
/// [`PassiveListener`]. Both publish to the same event channel.
///
/// A failed command marks the cover unavailable until the next command
/// succeeds.
pub struct Cover<T: Transport> {
    client: CoverClient<T>,
    listener: Arc<PassiveListener>,
    available: AtomicBool,
}

impl<T: Transport> Cover<T> {
    /// Build a cover for `identity` on `transport`.
    pub fn new(
        identity: DeviceIdentity,
        transport: Arc<T>,
        client_config: ClientConfig,
        listener_options: PassiveListenerOptions,
    ) -> Self {
        let events = EventDispatcher::new(listener_options.channel_capacity);
        let listener = Arc::new(PassiveListener::with_events(
            identity.clone(),
            listener_options,
            events.clone(),
        ));
        let client = CoverClient::new(identity, transport, client_config).with_events(events);
        Self {
            client,
            listener,
            available: AtomicBool::new(true),
        }
    }

    /// The cover's identity.
    pub fn identity(&self) -> &DeviceIdentity {
        self.client.identity()
    }

    /// The command sender.
    pub fn client(&self) -> &CoverClient<T> {
        &self.client
    }

    /// The broadcast listener.
    pub fn listener(&self) -> &Arc<PassiveListener> {
        &self.listener
    }

    /// Move the cover fully up.
    pub async fn open(&self) -> Result<()> {
        self.run(Command::MoveUp).await
    }

    /// Move the cover fully down.
    pub async fn close(&self) -> Result<()> {
        self.run(Command::MoveDown).await
    }

    /// Stop any movement.
    pub async fn stop(&self) -> Result<()> {
        self.run(Command::Stop).await
    }

    /// Move up by one step.
    pub async fn step_up(&self) -> Result<()> {
        self.run(Command::StepUp).await
    }

    /// Move down by one step.
    pub async fn step_down(&self) -> Result<()> {
        self.run(Command::StepDown).await
    }

    /// Move to `percent` (0 = closed, 100 = open).
    pub async fn set_position(&self, percent: i32) -> Result<()> {
        self.run(Command::SetPosition(percent)).await
    }

    async fn run(&self, command: Command) -> Result<()> {
        match self.client.send(command).await {
            Ok(()) => {
                self.available.store(true, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                // an invalid argument never reached the device
                if !matches!(e, Error::InvalidArgument(_)) {
                    warn!("Marking {} unavailable", self.identity());
                    self.available.store(false, Ordering::Relaxed);
                }
                Err(e)
            }
        }
    }

    /// Last broadcast position in percent, if any was received.
    pub async fn current_position(&self) -> Option<u8> {
        self.listener.position().await.map(|p| p.percent())
    }

    /// Whether the cover is fully closed; `None` while the position is unknown.
    pub async fn is_closed(&self) -> Option<bool> {
        self.listener.position().await.map(|p| p.is_closed())
    }

    /// False after a failed command, until the next success.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed) && self.listener.is_available()
    }

    /// Subscribe to position and command events.
    pub fn subscribe(&self) -> broadcast::Receiver<CoverEvent> {
        self.listener.subscribe()
    }

    /// Close any retained connection.
    pub async fn disconnect(&self) {
        self.client.disconnect().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use gira_types::protocol::BROADCAST_PREFIX;
    use gira_types::uuids::MANUFACTURER_ID;

    const ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

    fn cover(transport: &MockTransport, config: ClientConfig) -> Cover<MockTransport> {
        Cover::new(
            DeviceIdentity::new(ADDRESS, "Bedroom"),
            Arc::new(transport.clone()),
            config,
            PassiveListenerOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_open_close_map_to_move_commands() {
        let transport = MockTransport::new().with_device(ADDRESS);
        let cover = cover(&transport, ClientConfig::default());

        cover.open().await.unwrap();
        cover.close().await.unwrap();

        let values: Vec<(u8, u8)> = transport
            .writes()
            .into_iter()
            .map(|(data, _)| (data[4], data[7]))
            .collect();
        assert_eq!(values, vec![(0xFF, 0x00), (0xFF, 0x01)]);
    }

    #[tokio::test]
    async fn test_failure_marks_unavailable_until_success() {
        let transport = MockTransport::new().with_device(ADDRESS);
        let cover = cover(&transport, ClientConfig::default());
        assert!(cover.is_available());

        transport.set_write_failures(1);
        assert!(cover.stop().await.is_err());
        assert!(!cover.is_available());

        cover.stop().await.unwrap();
        assert!(cover.is_available());
    }

    #[tokio::test]
    async fn test_unreachable_cover_is_unavailable() {
        let transport = MockTransport::new();
        let cover = cover(&transport, ClientConfig::default());

        let err = cover.open().await.unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound(_)));
        assert!(!cover.is_available());

        transport.add_device(ADDRESS);
        cover.open().await.unwrap();
        assert!(cover.is_available());
    }

    #[tokio::test]
    async fn test_invalid_argument_keeps_available() {
        let transport = MockTransport::new().with_device(ADDRESS);
        let cover = cover(&transport, ClientConfig::default());

        assert!(cover.set_position(-1).await.is_err());
        assert!(cover.is_available());
    }

    #[tokio::test]
    async fn test_position_from_listener() {
        let transport = MockTransport::new().with_device(ADDRESS);
        let cover = cover(&transport, ClientConfig::default());
        assert_eq!(cover.current_position().await, None);
        assert_eq!(cover.is_closed().await, None);

        let mut data = BROADCAST_PREFIX.to_vec();
        data.push(0xFF);
        let event = crate::transport::AdvertisementEvent::Advertisement(
            crate::transport::Advertisement::with_manufacturer_data(ADDRESS, MANUFACTURER_ID, data),
        );
        cover.listener().handle_event(&event).await;

        assert_eq!(cover.current_position().await, Some(0));
        assert_eq!(cover.is_closed().await, Some(true));
    }

    #[tokio::test]
    async fn test_shared_event_channel() {
        let transport = MockTransport::new().with_device(ADDRESS);
        let cover = cover(&transport, ClientConfig::default());
        let mut rx = cover.subscribe();

        cover.step_up().await.unwrap();
        assert!(matches!(
            rx.recv().await.unwrap(),
            CoverEvent::CommandSent {
                command: Command::StepUp,
                ..
            }
        ));
    }
}

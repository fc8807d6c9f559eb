//! Passive position tracking via BLE advertisements.
//!
//! Gira covers periodically broadcast their position in manufacturer data
//! (company id 1412). [`PassiveListener`] follows those broadcasts for one
//! device without ever opening a connection, so it never competes with
//! [`CoverClient`](crate::client::CoverClient) for the link.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use gira_core::{BtleTransport, PassiveListener, PassiveListenerOptions};
//! use gira_types::DeviceIdentity;
//! use tokio_util::sync::CancellationToken;
//!
//! let listener = Arc::new(PassiveListener::new(
//!     DeviceIdentity::new("AA:BB:CC:DD:EE:FF", "Kitchen"),
//!     PassiveListenerOptions::default(),
//! ));
//! let mut rx = listener.subscribe();
//! let handle = listener.start(Arc::new(BtleTransport::new().await?), CancellationToken::new()).await?;
//!
//! while let Ok(event) = rx.recv().await {
//!     println!("{:?}", event);
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gira_types::codec::{decode_broadcast, to_hex};
use gira_types::uuids::MANUFACTURER_ID;
use gira_types::{BroadcastReading, DeviceIdentity, Position};

use crate::error::Result;
use crate::events::{CoverEvent, DeviceId, EventDispatcher};
use crate::transport::{
    Advertisement, AdvertisementEvent, AdvertisementFilter, AdvertisementSource, ScanMode,
};

/// Options for passive listening.
#[derive(Debug, Clone)]
pub struct PassiveListenerOptions {
    /// Channel capacity for events.
    pub channel_capacity: usize,
    /// Only publish readings when the position changes.
    pub deduplicate: bool,
    /// Re-publish an unchanged reading once it is this old (if deduplicate is true).
    pub max_reading_age: Duration,
    /// Report the device unavailable after this long without a broadcast.
    pub unavailable_after: Duration,
    /// Scan mode requested from the stack.
    pub scan_mode: ScanMode,
    /// Delay before resubscribing when the advertisement stream ends.
    pub resubscribe_interval: Duration,
}

impl Default for PassiveListenerOptions {
    fn default() -> Self {
        Self {
            channel_capacity: 100,
            deduplicate: false,
            max_reading_age: Duration::from_secs(60),
            unavailable_after: Duration::from_secs(900),
            scan_mode: ScanMode::Passive,
            resubscribe_interval: Duration::from_secs(5),
        }
    }
}

impl PassiveListenerOptions {
    /// Create new options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable deduplication.
    #[must_use]
    pub fn deduplicate(mut self, enable: bool) -> Self {
        self.deduplicate = enable;
        self
    }

    /// Set the maximum age before an unchanged reading is re-published.
    #[must_use]
    pub fn max_reading_age(mut self, age: Duration) -> Self {
        self.max_reading_age = age;
        self
    }

    /// Set the staleness timeout.
    #[must_use]
    pub fn unavailable_after(mut self, timeout: Duration) -> Self {
        self.unavailable_after = timeout;
        self
    }

    /// Set the channel capacity.
    #[must_use]
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }
}

/// Lifecycle of a [`PassiveListener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerStatus {
    /// Not subscribed to advertisements.
    Idle,
    /// Subscribed and receiving (or waiting for) broadcasts.
    Listening,
    /// The stack reported the device gone.
    Unavailable,
}

/// Most recent decoded position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// Converted position.
    pub position: Position,
    /// Raw broadcast byte.
    pub raw: u8,
    /// Signal strength of the advertisement, if reported.
    pub rssi: Option<i16>,
    /// When the broadcast was received.
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
    /// Set when the device was reported unavailable after this reading.
    pub stale: bool,
}

struct ListenerState {
    status: ListenerStatus,
    snapshot: Option<PositionSnapshot>,
    last_published: Option<Instant>,
}

/// Tracks the broadcast position of one cover.
pub struct PassiveListener {
    identity: DeviceIdentity,
    options: PassiveListenerOptions,
    events: EventDispatcher,
    state: RwLock<ListenerState>,
}

impl PassiveListener {
    /// Create a listener for `identity`. Nothing happens until [`start`](Self::start).
    pub fn new(identity: DeviceIdentity, options: PassiveListenerOptions) -> Self {
        let events = EventDispatcher::new(options.channel_capacity);
        Self::with_events(identity, options, events)
    }

    /// Create a listener that publishes to an existing dispatcher.
    pub fn with_events(
        identity: DeviceIdentity,
        options: PassiveListenerOptions,
        events: EventDispatcher,
    ) -> Self {
        Self {
            identity,
            options,
            events,
            state: RwLock::new(ListenerState {
                status: ListenerStatus::Idle,
                snapshot: None,
                last_published: None,
            }),
        }
    }

    /// The tracked device.
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// The dispatcher position events are published on.
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> broadcast::Receiver<CoverEvent> {
        self.events.subscribe()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// Passive listening is always considered available; staleness is
    /// reported through [`ListenerStatus::Unavailable`] instead.
    pub fn is_available(&self) -> bool {
        true
    }

    /// Current lifecycle state.
    pub async fn status(&self) -> ListenerStatus {
        self.state.read().await.status
    }

    /// Last decoded position, if any broadcast was received.
    pub async fn position(&self) -> Option<Position> {
        self.state.read().await.snapshot.as_ref().map(|s| s.position)
    }

    /// Last decoded reading with its metadata.
    pub async fn snapshot(&self) -> Option<PositionSnapshot> {
        self.state.read().await.snapshot.clone()
    }

    fn filter(&self) -> AdvertisementFilter {
        AdvertisementFilter::for_address(self.identity.address.clone())
            .mode(self.options.scan_mode)
            .unavailable_after(self.options.unavailable_after)
    }

    /// Subscribe to `source` and process events in a background task.
    ///
    /// The subscription is made before this returns, so a failure to start
    /// scanning is reported to the caller. The task runs until `cancel` is
    /// triggered; if the stream ends it resubscribes after
    /// [`PassiveListenerOptions::resubscribe_interval`].
    pub async fn start<S>(
        self: &Arc<Self>,
        source: Arc<S>,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>>
    where
        S: AdvertisementSource + 'static,
    {
        let filter = self.filter();
        let stream = source.advertisements(&filter).await?;
        self.set_status(ListenerStatus::Listening).await;
        info!("Listening for broadcasts from {}", self.identity);

        let listener = Arc::clone(self);
        Ok(tokio::spawn(async move {
            listener.run(source, filter, stream, cancel).await;
        }))
    }

    async fn run<S>(
        &self,
        source: Arc<S>,
        filter: AdvertisementFilter,
        stream: BoxStream<'static, AdvertisementEvent>,
        cancel: CancellationToken,
    ) where
        S: AdvertisementSource + 'static,
    {
        let mut stream = Some(stream);

        loop {
            let Some(events) = stream.as_mut() else {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(self.options.resubscribe_interval) => {}
                }
                match source.advertisements(&filter).await {
                    Ok(s) => {
                        info!("Resubscribed to broadcasts from {}", self.identity);
                        stream = Some(s);
                    }
                    Err(e) => warn!("Failed to resubscribe to broadcasts: {}", e),
                }
                continue;
            };

            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.next() => event,
            };
            match next {
                Some(event) => {
                    self.handle_event(&event).await;
                }
                None => {
                    warn!("Advertisement stream for {} ended", self.identity);
                    stream = None;
                }
            }
        }

        self.set_status(ListenerStatus::Idle).await;
        info!("Stopped listening for broadcasts from {}", self.identity);
    }

    async fn set_status(&self, status: ListenerStatus) {
        self.state.write().await.status = status;
    }

    /// Process one advertisement event.
    ///
    /// Returns the decoded reading when the event carried a valid position
    /// broadcast for this device. Everything else is discarded.
    pub async fn handle_event(&self, event: &AdvertisementEvent) -> Option<BroadcastReading> {
        match event {
            AdvertisementEvent::Advertisement(adv) => self.handle_advertisement(adv).await,
            AdvertisementEvent::Unavailable { address } => {
                if self.identity.matches_address(address) {
                    self.mark_unavailable().await;
                }
                None
            }
        }
    }

    async fn handle_advertisement(&self, adv: &Advertisement) -> Option<BroadcastReading> {
        if !self.identity.matches_address(&adv.address) {
            return None;
        }
        let data = adv.manufacturer_data.get(&MANUFACTURER_ID)?;
        let Some(reading) = decode_broadcast(data) else {
            debug!(
                "Ignoring manufacturer data from {} without a position: {}",
                adv.address,
                to_hex(data)
            );
            return None;
        };

        let received_at = OffsetDateTime::now_utc();
        let publish = {
            let mut state = self.state.write().await;
            let publish = self.should_publish(&state, reading.raw);
            state.snapshot = Some(PositionSnapshot {
                position: reading.position,
                raw: reading.raw,
                rssi: adv.rssi,
                received_at,
                stale: false,
            });
            state.status = ListenerStatus::Listening;
            if publish {
                state.last_published = Some(Instant::now());
            }
            publish
        };

        if publish {
            debug!("{} reports {}", self.identity, reading.position);
            self.events.send(CoverEvent::PositionChanged {
                device: DeviceId::from(&self.identity),
                position: reading.position,
                raw: reading.raw,
                received_at,
            });
        }
        Some(reading)
    }

    fn should_publish(&self, state: &ListenerState, raw: u8) -> bool {
        if !self.options.deduplicate {
            return true;
        }
        let Some(previous) = &state.snapshot else {
            return true;
        };
        if previous.stale || previous.raw != raw {
            return true;
        }
        state
            .last_published
            .is_none_or(|at| at.elapsed() > self.options.max_reading_age)
    }

    async fn mark_unavailable(&self) {
        {
            let mut state = self.state.write().await;
            if state.status == ListenerStatus::Unavailable {
                return;
            }
            state.status = ListenerStatus::Unavailable;
            if let Some(snapshot) = state.snapshot.as_mut() {
                snapshot.stale = true;
            }
        }
        warn!("{} is no longer broadcasting", self.identity);
        self.events.send(CoverEvent::Unavailable {
            device: DeviceId::from(&self.identity),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gira_types::protocol::BROADCAST_PREFIX;

    const ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

    fn listener(options: PassiveListenerOptions) -> PassiveListener {
        PassiveListener::new(DeviceIdentity::new(ADDRESS, "Terrace"), options)
    }

    fn broadcast(address: &str, raw: u8) -> AdvertisementEvent {
        let mut data = vec![0x02, 0x15];
        data.extend_from_slice(&BROADCAST_PREFIX);
        data.push(raw);
        AdvertisementEvent::Advertisement(Advertisement::with_manufacturer_data(
            address,
            MANUFACTURER_ID,
            data,
        ))
    }

    #[test]
    fn test_options_default() {
        let opts = PassiveListenerOptions::default();
        assert!(!opts.deduplicate);
        assert_eq!(opts.unavailable_after, Duration::from_secs(900));
        assert_eq!(opts.scan_mode, ScanMode::Passive);
    }

    #[test]
    fn test_options_builder() {
        let opts = PassiveListenerOptions::new()
            .deduplicate(true)
            .max_reading_age(Duration::from_secs(5))
            .unavailable_after(Duration::from_secs(30))
            .channel_capacity(8);
        assert!(opts.deduplicate);
        assert_eq!(opts.max_reading_age, Duration::from_secs(5));
        assert_eq!(opts.unavailable_after, Duration::from_secs(30));
        assert_eq!(opts.channel_capacity, 8);
    }

    #[tokio::test]
    async fn test_initial_state() {
        let listener = listener(PassiveListenerOptions::default());
        assert_eq!(listener.status().await, ListenerStatus::Idle);
        assert_eq!(listener.position().await, None);
        assert!(listener.is_available());
    }

    #[tokio::test]
    async fn test_valid_broadcast_updates_position() {
        let listener = listener(PassiveListenerOptions::default());
        let mut rx = listener.subscribe();

        let reading = listener.handle_event(&broadcast(ADDRESS, 0x7A)).await.unwrap();
        assert_eq!(reading.position.percent(), 52);
        assert_eq!(listener.position().await.map(Position::percent), Some(52));
        assert_eq!(listener.status().await, ListenerStatus::Listening);

        match rx.recv().await.unwrap() {
            CoverEvent::PositionChanged { position, raw, .. } => {
                assert_eq!(position.percent(), 52);
                assert_eq!(raw, 0x7A);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_address_match_is_case_insensitive() {
        let listener = listener(PassiveListenerOptions::default());
        assert!(
            listener
                .handle_event(&broadcast("aa:bb:cc:dd:ee:ff", 0))
                .await
                .is_some()
        );
        assert!(
            listener
                .handle_event(&broadcast("11:22:33:44:55:66", 0))
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_malformed_data_is_ignored() {
        let listener = listener(PassiveListenerOptions::default());
        listener.handle_event(&broadcast(ADDRESS, 255)).await;

        let truncated = AdvertisementEvent::Advertisement(Advertisement::with_manufacturer_data(
            ADDRESS,
            MANUFACTURER_ID,
            BROADCAST_PREFIX.to_vec(),
        ));
        let other_vendor = AdvertisementEvent::Advertisement(
            Advertisement::with_manufacturer_data(ADDRESS, 0x004C, vec![0x00; 12]),
        );

        assert!(listener.handle_event(&truncated).await.is_none());
        assert!(listener.handle_event(&other_vendor).await.is_none());
        assert_eq!(listener.position().await, Some(Position::CLOSED));
    }

    #[tokio::test]
    async fn test_unavailable_keeps_position() {
        let listener = listener(PassiveListenerOptions::default());
        let mut rx = listener.subscribe();
        listener.handle_event(&broadcast(ADDRESS, 0)).await;
        let _ = rx.recv().await;

        listener
            .handle_event(&AdvertisementEvent::Unavailable {
                address: ADDRESS.to_lowercase(),
            })
            .await;

        assert_eq!(listener.status().await, ListenerStatus::Unavailable);
        let snapshot = listener.snapshot().await.unwrap();
        assert!(snapshot.stale);
        assert_eq!(snapshot.position, Position::OPEN);
        assert!(matches!(rx.recv().await.unwrap(), CoverEvent::Unavailable { .. }));

        listener.handle_event(&broadcast(ADDRESS, 0)).await;
        assert_eq!(listener.status().await, ListenerStatus::Listening);
        assert!(!listener.snapshot().await.unwrap().stale);
    }

    #[tokio::test]
    async fn test_every_reading_published_by_default() {
        let listener = listener(PassiveListenerOptions::default());
        let mut rx = listener.subscribe();

        listener.handle_event(&broadcast(ADDRESS, 10)).await;
        listener.handle_event(&broadcast(ADDRESS, 10)).await;

        assert!(rx.recv().await.is_ok());
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deduplicate() {
        let listener = listener(
            PassiveListenerOptions::new()
                .deduplicate(true)
                .max_reading_age(Duration::from_secs(60)),
        );
        let mut rx = listener.subscribe();

        listener.handle_event(&broadcast(ADDRESS, 10)).await;
        listener.handle_event(&broadcast(ADDRESS, 10)).await;
        listener.handle_event(&broadcast(ADDRESS, 20)).await;
        tokio::time::advance(Duration::from_secs(61)).await;
        listener.handle_event(&broadcast(ADDRESS, 20)).await;

        let raws: Vec<u8> = std::iter::from_fn(|| match rx.try_recv() {
            Ok(CoverEvent::PositionChanged { raw, .. }) => Some(raw),
            _ => None,
        })
        .collect();
        assert_eq!(raws, vec![10, 20, 20]);
    }
}

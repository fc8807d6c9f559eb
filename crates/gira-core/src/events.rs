//! Cover events.
//!
//! Decoded broadcasts, availability changes and command outcomes are
//! published as [`CoverEvent`]s on a tokio broadcast channel. Every event
//! serializes to tagged JSON, which is what `gira watch --format json`
//! prints.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::broadcast;

use gira_types::{Command, DeviceIdentity, Position};

/// Which cover an event is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Address as given by the caller.
    pub id: String,
    pub name: Option<String>,
}

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    pub fn with_name(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
        }
    }
}

impl From<&DeviceIdentity> for DeviceId {
    fn from(identity: &DeviceIdentity) -> Self {
        Self::with_name(identity.address.clone(), identity.name.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum CoverEvent {
    /// A position broadcast was decoded.
    PositionChanged {
        device: DeviceId,
        position: Position,
        raw: u8,
        #[serde(with = "time::serde::rfc3339")]
        received_at: OffsetDateTime,
    },
    /// No broadcast arrived within the stale timeout.
    Unavailable { device: DeviceId },
    CommandSent {
        device: DeviceId,
        command: Command,
        /// Written over a retained connection instead of a fresh one.
        reused_connection: bool,
    },
    CommandFailed {
        device: DeviceId,
        command: Command,
        error: String,
    },
    /// Connect attempt `attempt` failed; another one follows.
    ConnectRetry { device: DeviceId, attempt: u32 },
}

impl CoverEvent {
    pub fn device(&self) -> &DeviceId {
        match self {
            CoverEvent::PositionChanged { device, .. }
            | CoverEvent::Unavailable { device }
            | CoverEvent::CommandSent { device, .. }
            | CoverEvent::CommandFailed { device, .. }
            | CoverEvent::ConnectRetry { device, .. } => device,
        }
    }
}

pub type EventReceiver = broadcast::Receiver<CoverEvent>;

/// Fan-out of cover events to any number of subscribers.
///
/// Publishing never blocks and succeeds without subscribers. A subscriber
/// that falls more than `capacity` events behind loses the oldest ones and
/// sees [`broadcast::error::RecvError::Lagged`].
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: broadcast::Sender<CoverEvent>,
}

impl EventDispatcher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn send(&self, event: CoverEvent) {
        let _ = self.sender.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(64)
    }
}
